//! Startup and infrastructure errors.
//!
//! Per-request failures (bad keys, unreadable bodies, faulting grains) are
//! expressed as HTTP [`Response`](crate::Response) values and never show up
//! here. This module covers what stops the gateway from starting or serving.

use crate::method::Verb;

/// The error type returned by [`Server::serve`](crate::Server::serve).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The bind address is not a valid `host:port`.
    #[error("invalid bind address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// The gateway could not be assembled.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

/// A fatal configuration problem detected while building the route table or
/// loading [`GatewayConfig`](crate::GatewayConfig).
///
/// Any of these aborts startup. A declared pattern without the id placeholder
/// is *not* one of them: that route is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate route `{verb} {template}`")]
    DuplicateRoute { template: String, verb: Verb },

    #[error("route `{verb} {template}` conflicts with an existing route: {reason}")]
    RouteConflict {
        template: String,
        verb: Verb,
        reason: String,
    },

    #[error("`{interface}.{method}` declares more than one body parameter")]
    MultipleBodyParameters { interface: String, method: String },

    #[error("route `{template}` names unknown resolver policy `{policy}`")]
    UnknownPolicy { template: String, policy: String },

    #[error("default resolver policy `{0}` is not registered")]
    UnknownDefaultPolicy(String),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("reading configuration: {0}")]
    Read(#[from] std::io::Error),
}
