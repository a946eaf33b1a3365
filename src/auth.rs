//! Authorization requirements carried by routes.
//!
//! The route table never evaluates identity. It attaches the effective
//! requirement to each entry, and the boundary in
//! [`middleware::auth`](crate::middleware::auth) checks it against the
//! request's [`Principal`] before dispatch.

use serde::Serialize;

/// What a caller must satisfy to reach a route.
///
/// An empty requirement (no policy, roles or schemes) still demands an
/// authenticated principal.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AuthorizationRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
}

impl AuthorizationRequirement {
    /// Any authenticated caller.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Callers holding at least one of `roles`.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { roles: roles.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    pub fn policy(name: impl Into<String>) -> Self {
        Self { policy: Some(name.into()), ..Self::default() }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.schemes.push(scheme.into());
        self
    }
}

/// Effective requirement for a route: the method level wins outright, then
/// the interface level, otherwise none. The two are never merged.
pub fn compose(
    interface_level: Option<&AuthorizationRequirement>,
    method_level: Option<&AuthorizationRequirement>,
) -> Option<AuthorizationRequirement> {
    method_level.or(interface_level).cloned()
}

/// An authenticated caller, produced by an
/// [`Authenticator`](crate::middleware::auth::Authenticator).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
    /// Scheme the caller authenticated with (e.g. `"Bearer"`).
    pub scheme: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), roles: Vec::new(), scheme: "Bearer".to_owned() }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
