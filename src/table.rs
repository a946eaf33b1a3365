//! The route table: built once from interface descriptors, read-only after.
//!
//! Building walks every declared route of every method, in declaration
//! order, and for each:
//!
//! 1. builds its template (a pattern without the id placeholder is logged
//!    and skipped);
//! 2. rejects a second registration of the same (template, verb);
//! 3. checks the named resolver policy exists;
//! 4. inserts it into the matching tree.
//!
//! Each entry carries everything dispatch needs: the descriptors, the key
//! scheme, the policy name, the effective authorization and the precomputed
//! [`BindingPlan`]. Nothing is inspected per request.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{self, AuthorizationRequirement};
use crate::binder::{BindingPlan, Slot};
use crate::config::GatewayConfig;
use crate::descriptor::{InterfaceDescriptor, MethodDescriptor, ReturnShape};
use crate::error::ConfigError;
use crate::key::{KeyScheme, KeySchemeCache};
use crate::method::Verb;
use crate::pattern;
use crate::resolver::ResolverRegistry;
use crate::router::{Lookup, Router};

/// One (template, verb) → method binding.
#[derive(Debug)]
pub struct RouteEntry {
    template: String,
    verb: Verb,
    interface: Arc<InterfaceDescriptor>,
    method: Arc<MethodDescriptor>,
    scheme: KeyScheme,
    policy: String,
    authorization: Option<AuthorizationRequirement>,
    plan: Arc<BindingPlan>,
}

impl RouteEntry {
    pub fn template(&self) -> &str { &self.template }
    pub fn verb(&self) -> Verb { self.verb }
    pub fn interface(&self) -> &InterfaceDescriptor { &self.interface }
    pub fn method(&self) -> &MethodDescriptor { &self.method }
    pub fn scheme(&self) -> KeyScheme { self.scheme }
    pub fn policy(&self) -> &str { &self.policy }
    pub fn authorization(&self) -> Option<&AuthorizationRequirement> { self.authorization.as_ref() }
    pub fn plan(&self) -> &BindingPlan { &self.plan }

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            template: self.template.clone(),
            verb: self.verb,
            interface: self.interface.name().to_owned(),
            method: self.method.name().to_owned(),
            scheme: self.scheme,
            policy: self.policy.clone(),
            authorization: self.authorization.clone(),
            returns: self.method.return_shape(),
            params: self.plan.slots().to_vec(),
        }
    }
}

/// A serializable, comparable view of one entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteSnapshot {
    pub template: String,
    pub verb: Verb,
    pub interface: String,
    pub method: String,
    pub scheme: KeyScheme,
    pub policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationRequirement>,
    pub returns: ReturnShape,
    pub params: Vec<Slot>,
}

/// Result of matching a request against the table.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        entry: &'a RouteEntry,
        /// Captured route values, original case, percent-decoded.
        params: Vec<(String, String)>,
    },
    NotAllowed(Vec<Verb>),
    NotFound,
    /// A template matched but a captured value is not valid UTF-8.
    Undecodable,
}

pub struct RouteTable {
    entries: Vec<RouteEntry>,
    router: Router,
}

impl RouteTable {
    pub fn lookup(&self, method: &http::Method, path: &str) -> RouteMatch<'_> {
        match self.router.lookup(method, path) {
            Lookup::Found(index) => match self.entries.get(index) {
                Some(entry) => match pattern::capture(&entry.template, path) {
                    Some(params) => RouteMatch::Found { entry, params },
                    None => RouteMatch::Undecodable,
                },
                None => RouteMatch::NotFound,
            },
            Lookup::NotAllowed(verbs) => RouteMatch::NotAllowed(verbs),
            Lookup::NotFound => RouteMatch::NotFound,
        }
    }

    pub fn entries(&self) -> &[RouteEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        self.entries.iter().map(RouteEntry::snapshot).collect()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("entries", &self.entries.len()).finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects interface descriptors and turns them into a [`RouteTable`].
#[derive(Clone, Debug)]
pub struct RouteTableBuilder {
    prefix: String,
    id_token: String,
    extension_token: String,
    default_policy: String,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
}

impl RouteTableBuilder {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            prefix: config.normalized_prefix(),
            id_token: config.id_token.clone(),
            extension_token: config.id_extension_token.clone(),
            default_policy: config.default_policy.clone(),
            interfaces: Vec::new(),
        }
    }

    pub fn interface(mut self, interface: InterfaceDescriptor) -> Self {
        self.interfaces.push(Arc::new(interface));
        self
    }

    /// Builds the table. Does not consume the builder, so the same
    /// descriptors can be rebuilt into an identical table.
    pub fn build(&self, resolvers: &ResolverRegistry, schemes: &KeySchemeCache) -> Result<RouteTable, ConfigError> {
        if !resolvers.contains(&self.default_policy) {
            return Err(ConfigError::UnknownDefaultPolicy(self.default_policy.clone()));
        }

        let mut entries = Vec::new();
        let mut router = Router::new();
        let mut seen = HashSet::new();

        for interface in &self.interfaces {
            let scheme = schemes.classify(interface);

            for method in interface.methods() {
                let plan = Arc::new(BindingPlan::build(method, &self.id_token, &self.extension_token)?);
                let authorization = auth::compose(interface.authorization(), method.authorization());

                for decl in method.routes() {
                    let Some(template) = pattern::build(
                        &self.prefix,
                        interface.prefix(),
                        interface.name(),
                        method.name(),
                        &decl.pattern,
                        &self.id_token,
                    ) else {
                        warn!(
                            interface = interface.name(),
                            method = method.name(),
                            pattern = %decl.pattern,
                            id_token = %self.id_token,
                            "route pattern lacks the id placeholder, skipping"
                        );
                        continue;
                    };

                    if !seen.insert((template.clone(), decl.verb)) {
                        return Err(ConfigError::DuplicateRoute { template, verb: decl.verb });
                    }

                    let policy = decl.policy.clone().unwrap_or_else(|| self.default_policy.clone());
                    if !resolvers.contains(&policy) {
                        return Err(ConfigError::UnknownPolicy { template, policy });
                    }

                    router.insert(decl.verb, &template, entries.len()).map_err(|e| ConfigError::RouteConflict {
                        template: template.clone(),
                        verb: decl.verb,
                        reason: e.to_string(),
                    })?;

                    info!(
                        verb = %decl.verb,
                        template = %template,
                        interface = interface.name(),
                        method = method.name(),
                        policy = %policy,
                        "route registered"
                    );

                    entries.push(RouteEntry {
                        template,
                        verb: decl.verb,
                        interface: Arc::clone(interface),
                        method: Arc::clone(method),
                        scheme,
                        policy,
                        authorization: authorization.clone(),
                        plan: Arc::clone(&plan),
                    });
                }
            }
        }

        Ok(RouteTable { entries, router })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use crate::descriptor::{ParamDescriptor, ParamType, RouteDecl};
    use crate::key::KeyMarker;
    use crate::resolver::RANDOM_POLICY;

    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig { prefix: "grains".to_owned(), id_token: "grainId".to_owned(), ..GatewayConfig::default() }
    }

    fn test_grain() -> InterfaceDescriptor {
        InterfaceDescriptor::new("ITestGrain")
            .route_prefix("Test")
            .key(KeyMarker::Guid)
            .authorize(AuthorizationRequirement::authenticated())
            .method(MethodDescriptor::new("Get2").get("{grainId}/Get2").returns(ReturnShape::Value))
            .method(
                MethodDescriptor::new("Get3")
                    .get("{grainId}/Get3/{hello}")
                    .param(ParamDescriptor::route("hello", ParamType::String))
                    .authorize(AuthorizationRequirement::roles(["admin"])),
            )
            .method(
                MethodDescriptor::new("SameUrl")
                    .get("{grainId}/SameUrl")
                    .post("{grainId}/SameUrl")
                    .route(RouteDecl::new(Verb::Get, "{grainId}/Stateless").policy(RANDOM_POLICY)),
            )
            .method(MethodDescriptor::new("Get6").get("Get6"))
    }

    fn build(builder: &RouteTableBuilder) -> Result<RouteTable, ConfigError> {
        builder.build(&ResolverRegistry::with_defaults(), &KeySchemeCache::new())
    }

    #[test]
    fn templates_combine_all_prefixes() {
        let table = build(&RouteTableBuilder::new(&config()).interface(test_grain())).unwrap();
        let templates: Vec<_> = table.entries().iter().map(RouteEntry::template).collect();
        assert_eq!(
            templates,
            vec![
                "grains/Test/{grainId}/Get2",
                "grains/Test/{grainId}/Get3/{hello}",
                "grains/Test/{grainId}/SameUrl",
                "grains/Test/{grainId}/SameUrl",
                "grains/Test/{grainId}/Stateless",
            ]
        );
        assert_eq!(table.entries()[4].policy(), RANDOM_POLICY);
        assert_eq!(table.entries()[0].scheme(), KeyScheme::Guid);
    }

    #[test]
    fn method_authorization_overrides_interface() {
        let table = build(&RouteTableBuilder::new(&config()).interface(test_grain())).unwrap();
        assert_eq!(table.entries()[0].authorization(), Some(&AuthorizationRequirement::authenticated()));
        assert_eq!(table.entries()[1].authorization(), Some(&AuthorizationRequirement::roles(["admin"])));
    }

    #[test]
    fn lookup_captures_original_case() {
        let table = build(&RouteTableBuilder::new(&config()).interface(test_grain())).unwrap();
        let RouteMatch::Found { entry, params } = table.lookup(&Method::GET, "/grains/test/abc/get3/World") else {
            panic!("expected a match");
        };
        assert_eq!(entry.method().name(), "Get3");
        assert_eq!(params, vec![("grainId".to_owned(), "abc".to_owned()), ("hello".to_owned(), "World".to_owned())]);
        assert!(matches!(table.lookup(&Method::DELETE, "/grains/test/abc/sameurl"), RouteMatch::NotAllowed(v) if v == vec![Verb::Get, Verb::Post]));
        assert!(matches!(table.lookup(&Method::GET, "/grains/test/%FF/get3/World"), RouteMatch::Undecodable));
    }

    #[test]
    fn duplicate_template_and_verb_fails_the_build() {
        let iface = InterfaceDescriptor::new("IDup")
            .method(MethodDescriptor::new("A").get("/dup/{id}"))
            .method(MethodDescriptor::new("B").get("/dup/{id}"));
        let err = build(&RouteTableBuilder::new(&GatewayConfig::default()).interface(iface)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRoute { verb: Verb::Get, .. }));
    }

    #[test]
    fn same_template_under_two_verbs_is_fine() {
        let iface = InterfaceDescriptor::new("IDup")
            .method(MethodDescriptor::new("A").get("/dup/{id}"))
            .method(MethodDescriptor::new("B").post("/dup/{id}"));
        assert_eq!(build(&RouteTableBuilder::new(&GatewayConfig::default()).interface(iface)).unwrap().len(), 2);
    }

    #[test]
    fn unknown_policies_fail_the_build() {
        let iface = InterfaceDescriptor::new("I")
            .method(MethodDescriptor::new("A").route(RouteDecl::new(Verb::Get, "/x/{id}").policy("sticky")));
        let err = build(&RouteTableBuilder::new(&GatewayConfig::default()).interface(iface)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy { policy, .. } if policy == "sticky"));

        let config = GatewayConfig { default_policy: "sticky".to_owned(), ..GatewayConfig::default() };
        let err = build(&RouteTableBuilder::new(&config)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDefaultPolicy(_)));
    }

    #[test]
    fn conflicting_templates_fail_the_build() {
        let iface = InterfaceDescriptor::new("I")
            .method(MethodDescriptor::new("A").get("/x/{id}/Get"))
            .method(MethodDescriptor::new("B").get("/X/{id}/get"));
        let err = build(&RouteTableBuilder::new(&GatewayConfig::default()).interface(iface)).unwrap_err();
        assert!(matches!(err, ConfigError::RouteConflict { .. }));
    }

    #[test]
    fn rebuilding_yields_identical_entries() {
        let builder = RouteTableBuilder::new(&config()).interface(test_grain());
        assert_eq!(build(&builder).unwrap().snapshot(), build(&builder).unwrap().snapshot());
    }
}
