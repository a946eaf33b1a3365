//! # graingate
//!
//! An HTTP gateway for actor-style grains. Declare what a grain exposes;
//! the gateway builds the routes, finds the grain, binds the arguments,
//! calls it and writes the reply.
//!
//! ## The contract
//!
//! The actor runtime owns activation, placement and consistency. The
//! gateway does not: it only needs "give me a reference for this key" and
//! "invoke this method and await the result", the [`GrainRuntime`] trait.
//! Token validation belongs to whoever issues tokens; the gateway consumes
//! a [`Principal`] from an [`Authenticator`](middleware::auth::Authenticator).
//!
//! What's left for graingate:
//!
//! - Route table construction from [`InterfaceDescriptor`]s, once, at startup
//! - Five grain key schemes, resolved from route values by pluggable policies
//! - Parameter binding from route, query and body with type coercion
//! - Content negotiation against pluggable [`MediaTypeHandler`]s (JSON, XML, forms)
//! - Per-route authorization (401 / 403)
//! - Radix-tree routing via [`matchit`], hyper for HTTP/1.1 and HTTP/2
//! - Graceful shutdown: SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use graingate::{
//!     CallContext, Gateway, GatewayConfig, Grain, InterfaceDescriptor, InvokeError, KeyMarker,
//!     LocalRuntime, MethodDescriptor, ParamDescriptor, ParamType, Reply, ReturnShape, Server,
//! };
//! use serde_json::{Value, json};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Grain for Hello {
//!     async fn call(&self, _method: &str, args: Vec<Value>, _: &CallContext) -> Result<Reply, InvokeError> {
//!         let name = args.first().and_then(Value::as_str).unwrap_or("world");
//!         Ok(json!(format!("hello, {name}")).into())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), graingate::Error> {
//!     let config = GatewayConfig { prefix: "grains".into(), ..GatewayConfig::default() };
//!     let runtime = LocalRuntime::new().register("IHello", |_| Hello);
//!
//!     let gateway = Gateway::builder(config.clone(), Arc::new(runtime))
//!         .interface(
//!             InterfaceDescriptor::new("IHello").key(KeyMarker::Guid).method(
//!                 MethodDescriptor::new("Greet")
//!                     .get("")
//!                     .param(ParamDescriptor::query("name", ParamType::String))
//!                     .returns(ReturnShape::Value),
//!             ),
//!         )
//!         .build()?;
//!
//!     // GET /grains/IHello/{guid}/Greet?name=ada
//!     Server::from_config(&config)?.serve(gateway).await
//! }
//! ```

mod binder;
mod coerce;
mod config;
mod descriptor;
mod diagnostics;
mod dispatch;
mod error;
mod gateway;
mod health;
mod invoker;
mod key;
mod media;
mod method;
mod request;
mod resolver;
mod response;
mod router;
mod runtime;
mod server;
mod table;

pub mod auth;
pub mod middleware;
pub mod pattern;

pub use auth::{AuthorizationRequirement, Principal};
pub use binder::{BindingFailure, BindingPlan, ParamSource, Slot};
pub use coerce::{coerce, conform};
pub use config::GatewayConfig;
pub use descriptor::{
    Annotation, GrainInterface, InterfaceDescriptor, MethodDescriptor, ParamDescriptor, ParamType, ReturnShape,
    RouteDecl,
};
pub use error::{ConfigError, Error};
pub use gateway::{Gateway, GatewayBuilder};
pub use invoker::invoke;
pub use key::{GrainKey, KeyMarker, KeyScheme, KeySchemeCache};
pub use media::{CodecError, FormMediaType, JsonMediaType, MediaTypeHandler, MediaTypeRegistry, XmlMediaType};
pub use method::Verb;
pub use request::RequestContext;
pub use resolver::{
    KeyTokens, RANDOM_POLICY, ROUTE_POLICY, RandomKeyResolver, ResolveContext, ResolveError, ResolveReference,
    RouteKeyResolver, parse_key,
};
pub use response::{Response, ResponseBuilder};
pub use runtime::{
    CallContext, DEFAULT_COLLECTION_AGE, Grain, GrainRef, GrainRuntime, HttpResult, InvokeError, LocalRuntime, Reply,
};
pub use server::Server;
pub use table::{RouteEntry, RouteMatch, RouteSnapshot, RouteTable, RouteTableBuilder};

/// MIME type constants.
pub mod mime {
    pub use crate::media::{FORM, JSON, TEXT, XML, XML_TEXT};
}
