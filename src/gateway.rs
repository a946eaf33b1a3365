//! The assembled gateway.
//!
//! A [`Gateway`] owns every registry the request path reads: the route
//! table, media types, resolver policies, the authenticator and the runtime.
//! It is built once by [`GatewayBuilder::build`] and is immutable after that
//! (save the readiness flag). Clones share the same state.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graingate::{Gateway, GatewayConfig, InterfaceDescriptor, KeyMarker, LocalRuntime, MethodDescriptor, Server};
//!
//! # async fn run() -> Result<(), graingate::Error> {
//! let config = GatewayConfig::from_toml_str(r#"prefix = "grains""#)?;
//! let gateway = Gateway::builder(config.clone(), Arc::new(LocalRuntime::new()))
//!     .interface(InterfaceDescriptor::new("IPing").key(KeyMarker::Integer).method(MethodDescriptor::new("Ping").get("")))
//!     .build()?;
//! Server::from_config(&config)?.serve(gateway).await
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use hyper::body::Body;
use tracing::Instrument;

use crate::auth::Principal;
use crate::config::GatewayConfig;
use crate::descriptor::{GrainInterface, InterfaceDescriptor};
use crate::dispatch;
use crate::error::ConfigError;
use crate::key::KeySchemeCache;
use crate::media::{MediaTypeHandler, MediaTypeRegistry};
use crate::middleware::auth::{Authenticator, Policies};
use crate::middleware::trace::RequestTrace;
use crate::resolver::{KeyTokens, ResolveReference, ResolverRegistry};
use crate::response::Response;
use crate::runtime::GrainRuntime;
use crate::table::{RouteTable, RouteTableBuilder};

/// State shared by every clone of a [`Gateway`].
pub(crate) struct Shared {
    pub(crate) config: GatewayConfig,
    pub(crate) table: RouteTable,
    pub(crate) media: MediaTypeRegistry,
    pub(crate) resolvers: ResolverRegistry,
    pub(crate) runtime: Arc<dyn GrainRuntime>,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) policies: Policies,
    pub(crate) tokens: KeyTokens,
    pub(crate) ready: AtomicBool,
}

#[derive(Clone)]
pub struct Gateway {
    shared: Arc<Shared>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig, runtime: Arc<dyn GrainRuntime>) -> GatewayBuilder {
        GatewayBuilder {
            routes: RouteTableBuilder::new(&config),
            config,
            runtime,
            media: MediaTypeRegistry::with_defaults(),
            resolvers: ResolverRegistry::with_defaults(),
            authenticator: None,
            policies: Policies::new(),
        }
    }

    /// Handles one request end to end: built-in endpoints, routing,
    /// authorization, resolution, binding, invocation.
    ///
    /// Never fails; every outcome is a [`Response`].
    pub async fn handle<B>(&self, request: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let trace = RequestTrace::start(request.method(), request.uri().path());
        let response = dispatch::dispatch(&self.shared, request)
            .instrument(trace.span().clone())
            .await;
        trace.finish(response.status_code());
        response
    }

    pub fn config(&self) -> &GatewayConfig { &self.shared.config }
    pub fn routes(&self) -> &RouteTable { &self.shared.table }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Sets what the readiness endpoint reports.
    pub fn set_ready(&self, ready: bool) {
        self.shared.ready.store(ready, Ordering::Release);
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("routes", &self.shared.table.len())
            .field("media", &self.shared.media)
            .field("resolvers", &self.shared.resolvers)
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects interfaces and extension points, then builds the route table.
pub struct GatewayBuilder {
    config: GatewayConfig,
    runtime: Arc<dyn GrainRuntime>,
    routes: RouteTableBuilder,
    media: MediaTypeRegistry,
    resolvers: ResolverRegistry,
    authenticator: Option<Arc<dyn Authenticator>>,
    policies: Policies,
}

impl GatewayBuilder {
    pub fn interface(mut self, interface: InterfaceDescriptor) -> Self {
        self.routes = self.routes.interface(interface);
        self
    }

    pub fn grain<G: GrainInterface>(self) -> Self {
        self.interface(G::describe())
    }

    /// Adds a codec. A later registration for the same MIME type wins.
    pub fn media_type(mut self, handler: impl MediaTypeHandler + 'static) -> Self {
        self.media.register(handler);
        self
    }

    /// Registers a resolver policy routes can name.
    pub fn resolver(mut self, name: &str, resolver: impl ResolveReference + 'static) -> Self {
        self.resolvers.register(name, resolver);
        self
    }

    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Registers a named authorization policy.
    pub fn policy<F>(mut self, name: &str, policy: F) -> Self
    where
        F: Fn(&Principal) -> bool + Send + Sync + 'static,
    {
        self.policies.insert(name, policy);
        self
    }

    pub fn build(self) -> Result<Gateway, ConfigError> {
        let schemes = KeySchemeCache::new();
        let table = self.routes.build(&self.resolvers, &schemes)?;
        let tokens = KeyTokens::from_config(&self.config);
        Ok(Gateway {
            shared: Arc::new(Shared {
                config: self.config,
                table,
                media: self.media,
                resolvers: self.resolvers,
                runtime: self.runtime,
                authenticator: self.authenticator,
                policies: self.policies,
                tokens,
                ready: AtomicBool::new(true),
            }),
        })
    }
}
