//! Authentication and authorization at the request boundary.
//!
//! Token validation is not the gateway's job. An [`Authenticator`] maps
//! request headers to a [`Principal`] (or none), and [`authorize`] checks that
//! principal against the route's effective requirement:
//!
//! | situation                                         | status |
//! |---------------------------------------------------|--------|
//! | no principal                                      | 401    |
//! | principal's scheme not among the allowed schemes  | 401    |
//! | none of the allowed roles                         | 403    |
//! | named policy not registered, or rejecting         | 403    |
//!
//! Routes without a requirement skip the check entirely.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};

use crate::auth::{AuthorizationRequirement, Principal};

/// Maps request credentials to a caller.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Principal>;
}

/// A fixed token → principal table read from `Authorization: <scheme> <token>`.
///
/// Suitable for tests, demos and service-to-service calls with pre-shared
/// tokens.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Principal>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        let principal = self.tokens.get(token.trim())?;
        Some(principal.clone().scheme(scheme))
    }
}

// ── Policies ──────────────────────────────────────────────────────────────────

type Policy = Arc<dyn Fn(&Principal) -> bool + Send + Sync>;

/// Named authorization policies, registered at startup.
#[derive(Clone, Default)]
pub struct Policies {
    policies: HashMap<String, Policy>,
}

impl Policies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: &str, policy: F)
    where
        F: Fn(&Principal) -> bool + Send + Sync + 'static,
    {
        self.policies.insert(name.to_owned(), Arc::new(policy));
    }

    fn check(&self, name: &str, principal: &Principal) -> Option<bool> {
        self.policies.get(name).map(|policy| policy(principal))
    }
}

impl fmt::Debug for Policies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.policies.keys()).finish()
    }
}

// ── Enforcement ───────────────────────────────────────────────────────────────

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum AuthorizationFailure {
    #[error("authentication required")]
    Unauthenticated,

    #[error("scheme `{0}` is not accepted here")]
    WrongScheme(String),

    #[error("none of the required roles")]
    MissingRole,

    #[error("policy `{0}` is not registered")]
    UnknownPolicy(String),

    #[error("policy `{0}` denied access")]
    PolicyDenied(String),
}

impl AuthorizationFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::WrongScheme(_) => StatusCode::UNAUTHORIZED,
            _                                            => StatusCode::FORBIDDEN,
        }
    }
}

/// Checks `principal` against `requirement`.
pub fn authorize(
    requirement: &AuthorizationRequirement,
    principal: Option<&Principal>,
    policies: &Policies,
) -> Result<(), AuthorizationFailure> {
    let principal = principal.ok_or(AuthorizationFailure::Unauthenticated)?;

    if !requirement.schemes.is_empty()
        && !requirement.schemes.iter().any(|s| s.eq_ignore_ascii_case(&principal.scheme))
    {
        return Err(AuthorizationFailure::WrongScheme(principal.scheme.clone()));
    }

    if !requirement.roles.is_empty() && !requirement.roles.iter().any(|r| principal.is_in_role(r)) {
        return Err(AuthorizationFailure::MissingRole);
    }

    if let Some(name) = &requirement.policy {
        match policies.check(name, principal) {
            Some(true) => {}
            Some(false) => return Err(AuthorizationFailure::PolicyDenied(name.clone())),
            None => return Err(AuthorizationFailure::UnknownPolicy(name.clone())),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use http::header::HeaderValue;

    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    fn tokens() -> StaticTokens {
        StaticTokens::new()
            .token("admin-token", Principal::new("ada").role("admin"))
            .token("user-token", Principal::new("bob").role("user"))
    }

    #[test]
    fn static_tokens_read_the_authorization_header() {
        let principal = tokens().authenticate(&headers("Bearer admin-token")).unwrap();
        assert_eq!(principal.name, "ada");
        assert_eq!(principal.scheme, "Bearer");
        assert!(tokens().authenticate(&headers("Bearer nope")).is_none());
        assert!(tokens().authenticate(&HeaderMap::new()).is_none());
    }

    #[test]
    fn roles_decide_between_403_and_ok() {
        let requirement = AuthorizationRequirement::roles(["admin"]);
        let policies = Policies::new();
        let user = Principal::new("bob").role("user");
        let admin = Principal::new("ada").role("admin");

        assert_eq!(authorize(&requirement, None, &policies).unwrap_err().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(authorize(&requirement, Some(&user), &policies).unwrap_err().status(), StatusCode::FORBIDDEN);
        assert!(authorize(&requirement, Some(&admin), &policies).is_ok());
    }

    #[test]
    fn schemes_are_checked_before_roles() {
        let requirement = AuthorizationRequirement::roles(["admin"]).with_scheme("ApiKey");
        let admin = Principal::new("ada").role("admin");
        let err = authorize(&requirement, Some(&admin), &Policies::new()).unwrap_err();
        assert_eq!(err, AuthorizationFailure::WrongScheme("Bearer".into()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn policies_must_exist_and_pass() {
        let mut policies = Policies::new();
        policies.insert("named-ada", |p: &Principal| p.name == "ada");
        let ada = Principal::new("ada");
        let bob = Principal::new("bob");

        assert!(authorize(&AuthorizationRequirement::policy("named-ada"), Some(&ada), &policies).is_ok());
        assert_eq!(
            authorize(&AuthorizationRequirement::policy("named-ada"), Some(&bob), &policies),
            Err(AuthorizationFailure::PolicyDenied("named-ada".into()))
        );
        assert_eq!(
            authorize(&AuthorizationRequirement::policy("missing"), Some(&ada), &policies).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }
}
