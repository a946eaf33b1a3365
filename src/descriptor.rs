//! Declared grain metadata: the only input to route table construction.
//!
//! Descriptors are plain values built in code, once, at startup. They stand in
//! for attribute scanning: an interface lists its key markers, an optional
//! route prefix and authorization, and the methods it exposes over HTTP.
//!
//! ```rust
//! use graingate::{InterfaceDescriptor, KeyMarker, MethodDescriptor, ParamDescriptor, ParamType, ReturnShape};
//!
//! let hello = InterfaceDescriptor::new("IHelloGrain")
//!     .key(KeyMarker::Guid)
//!     .method(
//!         MethodDescriptor::new("Hello")
//!             .get("")
//!             .param(ParamDescriptor::query("name", ParamType::String))
//!             .returns(ReturnShape::Value),
//!     );
//! assert_eq!(hello.methods().len(), 1);
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::auth::AuthorizationRequirement;
use crate::key::KeyMarker;
use crate::method::Verb;

/// Implemented by types that describe a grain interface.
pub trait GrainInterface {
    fn describe() -> InterfaceDescriptor;
}

// ── Interface ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct InterfaceDescriptor {
    name: Arc<str>,
    route_prefix: String,
    key_markers: Vec<KeyMarker>,
    authorization: Option<AuthorizationRequirement>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            route_prefix: String::new(),
            key_markers: Vec::new(),
            authorization: None,
            methods: Vec::new(),
        }
    }

    /// Interface-level prefix inserted between the gateway prefix and the
    /// method pattern. A trailing `/` is added when missing.
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim();
        self.route_prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_owned()
        } else {
            format!("{prefix}/")
        };
        self
    }

    pub fn key(mut self, marker: KeyMarker) -> Self {
        if !self.key_markers.contains(&marker) {
            self.key_markers.push(marker);
        }
        self
    }

    pub fn authorize(mut self, requirement: AuthorizationRequirement) -> Self {
        self.authorization = Some(requirement);
        self
    }

    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.interface = Arc::clone(&self.name);
        self.methods.push(Arc::new(method));
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn prefix(&self) -> &str { &self.route_prefix }
    pub fn key_markers(&self) -> &[KeyMarker] { &self.key_markers }
    pub fn authorization(&self) -> Option<&AuthorizationRequirement> { self.authorization.as_ref() }
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] { &self.methods }
}

// ── Method ────────────────────────────────────────────────────────────────────

/// One remotely invocable method and the routes that reach it.
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    interface: Arc<str>,
    name: String,
    routes: Vec<RouteDecl>,
    params: Vec<ParamDescriptor>,
    returns: ReturnShape,
    authorization: Option<AuthorizationRequirement>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            interface: Arc::from(""),
            name: name.into(),
            routes: Vec::new(),
            params: Vec::new(),
            returns: ReturnShape::None,
            authorization: None,
        }
    }

    pub fn route(mut self, route: RouteDecl) -> Self {
        self.routes.push(route);
        self
    }

    pub fn get(self, pattern: &str) -> Self { self.route(RouteDecl::new(Verb::Get, pattern)) }
    pub fn post(self, pattern: &str) -> Self { self.route(RouteDecl::new(Verb::Post, pattern)) }
    pub fn put(self, pattern: &str) -> Self { self.route(RouteDecl::new(Verb::Put, pattern)) }
    pub fn delete(self, pattern: &str) -> Self { self.route(RouteDecl::new(Verb::Delete, pattern)) }
    /// Registers the method under the `*` verb.
    pub fn any(self, pattern: &str) -> Self { self.route(RouteDecl::new(Verb::Any, pattern)) }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn authorize(mut self, requirement: AuthorizationRequirement) -> Self {
        self.authorization = Some(requirement);
        self
    }

    pub fn interface(&self) -> &str { &self.interface }
    pub fn name(&self) -> &str { &self.name }
    pub fn routes(&self) -> &[RouteDecl] { &self.routes }
    pub fn params(&self) -> &[ParamDescriptor] { &self.params }
    pub fn return_shape(&self) -> ReturnShape { self.returns }
    pub fn authorization(&self) -> Option<&AuthorizationRequirement> { self.authorization.as_ref() }
}

/// A verb + pattern pair, optionally naming the resolver policy to use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDecl {
    pub verb: Verb,
    pub pattern: String,
    pub policy: Option<String>,
}

impl RouteDecl {
    pub fn new(verb: Verb, pattern: &str) -> Self {
        Self { verb, pattern: pattern.to_owned(), policy: None }
    }

    pub fn policy(mut self, name: &str) -> Self {
        self.policy = Some(name.to_owned());
        self
    }
}

/// What the method hands back once its asynchronous call completes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    /// No value; the response body stays empty.
    None,
    Value,
    /// A wrapped HTTP result carrying its own status and headers.
    Wrapped,
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// Where a parameter is explicitly declared to come from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Annotation {
    FromBody,
    FromQuery,
}

/// Declared parameter type, driving coercion and body validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Long,
    Decimal,
    Double,
    Float,
    Byte,
    Bool,
    Guid,
    DateTime,
    Char,
    String,
    /// Best effort: try each scalar in turn, fall back to the raw string.
    Any,
    /// Structured document of any shape.
    Json,
    /// Flat string → string map (form bodies).
    Map,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: ParamType,
    pub annotation: Option<Annotation>,
    pub required: bool,
}

impl ParamDescriptor {
    /// A parameter read from the path variable of the same name.
    pub fn route(name: &str, ty: ParamType) -> Self {
        Self { name: name.to_owned(), ty, annotation: None, required: false }
    }

    pub fn query(name: &str, ty: ParamType) -> Self {
        Self { annotation: Some(Annotation::FromQuery), ..Self::route(name, ty) }
    }

    pub fn body(name: &str, ty: ParamType) -> Self {
        Self { annotation: Some(Annotation::FromBody), ..Self::route(name, ty) }
    }

    /// A required parameter that cannot be bound fails the request with 400
    /// instead of binding null.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_inherit_the_declaring_interface() {
        let iface = InterfaceDescriptor::new("ITestGrain")
            .route_prefix("Test")
            .method(MethodDescriptor::new("Get").get(""));
        assert_eq!(iface.prefix(), "Test/");
        assert_eq!(iface.methods()[0].interface(), "ITestGrain");
    }

    #[test]
    fn key_markers_are_deduplicated() {
        let iface = InterfaceDescriptor::new("I").key(KeyMarker::Guid).key(KeyMarker::Guid);
        assert_eq!(iface.key_markers(), &[KeyMarker::Guid]);
    }

    #[test]
    fn one_method_can_declare_several_routes() {
        let method = MethodDescriptor::new("SameUrlAndMethod")
            .get("{id}/SameUrlAndMethod")
            .post("{id}/SameUrlAndMethod")
            .route(RouteDecl::new(Verb::Get, "{id}/other").policy("random"));
        assert_eq!(method.routes().len(), 3);
        assert_eq!(method.routes()[2].policy.as_deref(), Some("random"));
    }
}
