//! Grain reference resolution.
//!
//! A resolver turns the matched route values into a [`GrainRef`]. Resolvers
//! are registered by policy name; each route names one, or falls back to the
//! configured default.
//!
//! | policy   | key source                                             |
//! |----------|--------------------------------------------------------|
//! | `route`  | the `id` / `idExtension` route values, per key scheme  |
//! | `random` | a fresh key on every call; the URL is ignored          |
//!
//! # Outcomes
//!
//! `Ok(Some(_))` proceeds to binding. `Ok(None)` stops the request with the
//! status the resolver set on its [`ResolveContext`], or 400 when it set
//! none. An `Err` is logged; [`ResolveError::MalformedKey`] answers 400 and
//! anything else 500, unless a status was set explicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::warn;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::descriptor::InterfaceDescriptor;
use crate::key::{GrainKey, KeyScheme};
use crate::runtime::{GrainRef, GrainRuntime};

pub const ROUTE_POLICY: &str = "route";
pub const RANDOM_POLICY: &str = "random";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed {scheme} key `{value}`: {reason}")]
    MalformedKey { scheme: KeyScheme, value: String, reason: &'static str },

    #[error("route value `{0}` is missing")]
    MissingKey(String),

    #[error("{0}")]
    Internal(String),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedKey { .. } | Self::MissingKey(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_)                               => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Names of the route values carrying a grain key, and the compound separator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyTokens {
    pub id: String,
    pub extension: String,
    pub separator: String,
}

impl KeyTokens {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            id: config.id_token.clone(),
            extension: config.id_extension_token.clone(),
            separator: config.key_separator.clone(),
        }
    }
}

impl Default for KeyTokens {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything a resolver may look at, plus the status slot it may write.
pub struct ResolveContext<'a> {
    route_values: &'a [(String, String)],
    scheme: KeyScheme,
    tokens: &'a KeyTokens,
    runtime: &'a dyn GrainRuntime,
    status: Option<StatusCode>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        route_values: &'a [(String, String)],
        scheme: KeyScheme,
        tokens: &'a KeyTokens,
        runtime: &'a dyn GrainRuntime,
    ) -> Self {
        Self { route_values, scheme, tokens, runtime, status: None }
    }

    /// Case-insensitive route value lookup.
    pub fn route_value(&self, name: &str) -> Option<&'a str> {
        self.route_values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn scheme(&self) -> KeyScheme { self.scheme }
    pub fn tokens(&self) -> &'a KeyTokens { self.tokens }
    pub fn runtime(&self) -> &'a dyn GrainRuntime { self.runtime }

    /// Sets the status the request ends with when no reference is returned.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> { self.status }
}

/// A reference resolution strategy.
#[async_trait]
pub trait ResolveReference: Send + Sync {
    async fn resolve(
        &self,
        interface: &InterfaceDescriptor,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<Option<GrainRef>, ResolveError>;
}

// ── Built-in policies ─────────────────────────────────────────────────────────

/// Reads the key from the route values, converting it per key scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteKeyResolver;

#[async_trait]
impl ResolveReference for RouteKeyResolver {
    async fn resolve(
        &self,
        interface: &InterfaceDescriptor,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<Option<GrainRef>, ResolveError> {
        let tokens = ctx.tokens();
        let Some(id) = ctx.route_value(&tokens.id) else {
            return Err(ResolveError::MissingKey(tokens.id.clone()));
        };
        let extension = ctx.route_value(&tokens.extension);

        match parse_key(ctx.scheme(), id, extension, &tokens.separator) {
            Ok(key) => Ok(Some(ctx.runtime().reference(interface.name(), key))),
            Err(e) => {
                warn!(interface = interface.name(), error = %e, "rejecting malformed grain key");
                ctx.set_status(StatusCode::BAD_REQUEST);
                Ok(None)
            }
        }
    }
}

/// Synthesizes a fresh key per call. Suits stateless worker grains.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomKeyResolver;

#[async_trait]
impl ResolveReference for RandomKeyResolver {
    async fn resolve(
        &self,
        interface: &InterfaceDescriptor,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<Option<GrainRef>, ResolveError> {
        let id = Uuid::new_v4();
        let number = (id.as_u64_pair().0 & i64::MAX as u64) as i64;
        let extension = Uuid::new_v4().simple().to_string();
        let key = match ctx.scheme() {
            KeyScheme::Guid            => GrainKey::Guid(id),
            KeyScheme::String          => GrainKey::String(id.to_string()),
            KeyScheme::Integer         => GrainKey::Integer(number),
            KeyScheme::GuidCompound    => GrainKey::GuidCompound(id, extension),
            KeyScheme::IntegerCompound => GrainKey::IntegerCompound(number, extension),
        };
        Ok(Some(ctx.runtime().reference(interface.name(), key)))
    }
}

/// Parses a route id (and optional extension) into a key of `scheme`.
///
/// Compound schemes first split `id` on `separator`; without a separator the
/// extension comes from the dedicated route value. No extension at all is a
/// malformed key.
pub fn parse_key(
    scheme: KeyScheme,
    id: &str,
    extension: Option<&str>,
    separator: &str,
) -> Result<GrainKey, ResolveError> {
    let malformed = |reason| ResolveError::MalformedKey { scheme, value: id.to_owned(), reason };

    let (primary, extension) = if scheme.is_compound() {
        match id.split_once(separator).filter(|_| !separator.is_empty()) {
            Some((primary, ext)) => (primary, Some(ext)),
            None => (id, extension),
        }
    } else {
        (id, None)
    };

    let extension = || {
        extension
            .filter(|ext| !ext.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| malformed("missing key extension"))
    };
    let guid = || Uuid::parse_str(primary).map_err(|_| malformed("not a guid"));
    let integer = || primary.parse::<i64>().map_err(|_| malformed("not a 64-bit integer"));

    Ok(match scheme {
        KeyScheme::Guid            => GrainKey::Guid(guid()?),
        KeyScheme::Integer         => GrainKey::Integer(integer()?),
        KeyScheme::String          => GrainKey::String(primary.to_owned()),
        KeyScheme::GuidCompound    => GrainKey::GuidCompound(guid()?, extension()?),
        KeyScheme::IntegerCompound => GrainKey::IntegerCompound(integer()?, extension()?),
    })
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Policy name → resolver. Read-only once the gateway is built.
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn ResolveReference>>,
}

impl ResolverRegistry {
    /// A registry holding the `route` and `random` policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self { resolvers: HashMap::new() };
        registry.register(ROUTE_POLICY, RouteKeyResolver);
        registry.register(RANDOM_POLICY, RandomKeyResolver);
        registry
    }

    pub fn register(&mut self, name: &str, resolver: impl ResolveReference + 'static) {
        if self.resolvers.insert(name.to_owned(), Arc::new(resolver)).is_some() {
            warn!(policy = name, "resolver policy replaced by a later registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResolveReference>> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self { Self::with_defaults() }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry").field("policies", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::key::KeyMarker;
    use crate::runtime::LocalRuntime;

    use super::*;

    const GUID: &str = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

    fn guid() -> Uuid {
        Uuid::parse_str(GUID).unwrap()
    }

    #[test]
    fn every_scheme_parses_well_formed_ids() {
        use KeyScheme::*;
        assert_eq!(parse_key(Guid, GUID, None, "+").unwrap(), GrainKey::Guid(guid()));
        assert_eq!(parse_key(String, "alice", None, "+").unwrap(), GrainKey::String("alice".into()));
        assert_eq!(parse_key(Integer, "-42", None, "+").unwrap(), GrainKey::Integer(-42));
        assert_eq!(
            parse_key(GuidCompound, &format!("{GUID}+eu"), None, "+").unwrap(),
            GrainKey::GuidCompound(guid(), "eu".into())
        );
        assert_eq!(
            parse_key(IntegerCompound, "7", Some("us"), "+").unwrap(),
            GrainKey::IntegerCompound(7, "us".into())
        );
    }

    #[test]
    fn malformed_ids_are_errors_not_panics() {
        use KeyScheme::*;
        assert!(matches!(parse_key(Guid, "nope", None, "+"), Err(ResolveError::MalformedKey { .. })));
        assert!(matches!(parse_key(Integer, "12x", None, "+"), Err(ResolveError::MalformedKey { .. })));
        assert!(matches!(parse_key(IntegerCompound, "7", None, "+"), Err(ResolveError::MalformedKey { .. })));
        assert!(matches!(parse_key(GuidCompound, "nope+eu", None, "+"), Err(ResolveError::MalformedKey { .. })));
    }

    #[test]
    fn string_keys_keep_the_separator() {
        let key = parse_key(KeyScheme::String, "a+b", None, "+").unwrap();
        assert_eq!(key, GrainKey::String("a+b".into()));
    }

    #[tokio::test]
    async fn route_policy_sets_400_on_malformed_ids() {
        let runtime = LocalRuntime::new();
        let tokens = KeyTokens::default();
        let values = vec![("id".to_owned(), "not-a-guid".to_owned())];
        let iface = InterfaceDescriptor::new("ITest").key(KeyMarker::Guid);
        let mut ctx = ResolveContext::new(&values, KeyScheme::Guid, &tokens, &runtime);

        let resolved = RouteKeyResolver.resolve(&iface, &mut ctx).await.unwrap();
        assert!(resolved.is_none());
        assert_eq!(ctx.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn route_policy_reads_the_extension_token() {
        let runtime = LocalRuntime::new();
        let tokens = KeyTokens::default();
        let values = vec![
            ("ID".to_owned(), "9".to_owned()),
            ("idExtension".to_owned(), "west".to_owned()),
        ];
        let iface = InterfaceDescriptor::new("IRegion").key(KeyMarker::IntegerCompound);
        let mut ctx = ResolveContext::new(&values, KeyScheme::IntegerCompound, &tokens, &runtime);

        let grain = RouteKeyResolver.resolve(&iface, &mut ctx).await.unwrap().unwrap();
        assert_eq!(grain.key(), &GrainKey::IntegerCompound(9, "west".into()));
        assert_eq!(grain.interface(), "IRegion");
    }

    #[tokio::test]
    async fn random_policy_ignores_the_url() {
        let runtime = LocalRuntime::new();
        let tokens = KeyTokens::default();
        let iface = InterfaceDescriptor::new("IWorker").key(KeyMarker::Guid);
        let mut ctx = ResolveContext::new(&[], KeyScheme::Guid, &tokens, &runtime);

        let a = RandomKeyResolver.resolve(&iface, &mut ctx).await.unwrap().unwrap();
        let b = RandomKeyResolver.resolve(&iface, &mut ctx).await.unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.key().scheme(), KeyScheme::Guid);
    }

    #[test]
    fn defaults_register_both_policies() {
        let registry = ResolverRegistry::with_defaults();
        assert!(registry.contains(ROUTE_POLICY));
        assert!(registry.contains(RANDOM_POLICY));
        assert!(!registry.contains("sticky"));
    }
}
