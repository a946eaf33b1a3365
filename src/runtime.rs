//! The actor runtime boundary.
//!
//! The gateway never activates or places grains itself. It asks a
//! [`GrainRuntime`] for a reference by interface and key, then asks it to
//! invoke a method on that reference and awaits the [`Reply`].
//!
//! [`LocalRuntime`] is an in-process implementation: one activation per
//! (interface, key), created on first call from a registered factory and
//! collected once it sits idle longer than the collection age. It has no
//! persistence or placement.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use http::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::Principal;
use crate::key::GrainKey;

// ── References and calls ──────────────────────────────────────────────────────

/// Address of one grain: its interface name plus its key.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GrainRef {
    interface: Arc<str>,
    key: GrainKey,
}

impl GrainRef {
    pub fn new(interface: impl Into<Arc<str>>, key: GrainKey) -> Self {
        Self { interface: interface.into(), key }
    }

    pub fn interface(&self) -> &str { &self.interface }
    pub fn key(&self) -> &GrainKey { &self.key }
}

impl fmt::Display for GrainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.key)
    }
}

/// Per-call context handed to the runtime alongside the arguments.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    pub principal: Option<Principal>,
    /// Cancelled when the client goes away or the request deadline passes.
    pub cancellation: CancellationToken,
}

/// What a grain method produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Unit,
    Value(Value),
    Http(HttpResult),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self { Self::Value(value) }
}

impl From<HttpResult> for Reply {
    fn from(result: HttpResult) -> Self { Self::Http(result) }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The grain method failed. The message is logged, never sent.
    #[error("grain fault: {0}")]
    Fault(String),

    #[error("no grain registered for interface `{0}`")]
    UnknownInterface(String),

    #[error("`{interface}` has no method `{method}`")]
    UnknownMethod { interface: String, method: String },

    #[error("call cancelled")]
    Cancelled,
}

/// The capability the gateway consumes from an actor runtime.
#[async_trait]
pub trait GrainRuntime: Send + Sync {
    /// Builds a reference. No activation happens here.
    fn reference(&self, interface: &str, key: GrainKey) -> GrainRef;

    async fn invoke(
        &self,
        grain: &GrainRef,
        method: &str,
        args: Vec<Value>,
        ctx: &CallContext,
    ) -> Result<Reply, InvokeError>;
}

// ── HttpResult ────────────────────────────────────────────────────────────────

/// A grain reply that controls its own status and headers.
///
/// Only [`body`](HttpResult::body) goes through content negotiation; the
/// status and headers are copied onto the response as they are.
///
/// ```rust
/// use graingate::HttpResult;
/// use serde_json::json;
///
/// let created = HttpResult::created()
///     .header("CustomHeader", "HeaderValue")
///     .body(json!({"Number": 1}));
/// assert_eq!(created.status.as_u16(), 201);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResult {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpResult {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), body: None }
    }

    pub fn ok() -> Self              { Self::new(StatusCode::OK) }
    pub fn created() -> Self         { Self::new(StatusCode::CREATED) }
    pub fn accepted() -> Self        { Self::new(StatusCode::ACCEPTED) }
    pub fn no_content() -> Self      { Self::new(StatusCode::NO_CONTENT) }
    pub fn bad_request() -> Self     { Self::new(StatusCode::BAD_REQUEST) }
    pub fn unauthorized() -> Self    { Self::new(StatusCode::UNAUTHORIZED) }
    pub fn forbidden() -> Self       { Self::new(StatusCode::FORBIDDEN) }
    pub fn not_found() -> Self       { Self::new(StatusCode::NOT_FOUND) }
    pub fn not_acceptable() -> Self  { Self::new(StatusCode::NOT_ACCEPTABLE) }
    pub fn conflict() -> Self        { Self::new(StatusCode::CONFLICT) }
    pub fn not_implemented() -> Self { Self::new(StatusCode::NOT_IMPLEMENTED) }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// ── LocalRuntime ──────────────────────────────────────────────────────────────

/// A grain activation hosted by [`LocalRuntime`].
#[async_trait]
pub trait Grain: Send + Sync {
    async fn call(&self, method: &str, args: Vec<Value>, ctx: &CallContext) -> Result<Reply, InvokeError>;
}

type Factory = Arc<dyn Fn(&GrainKey) -> Arc<dyn Grain> + Send + Sync>;

/// Idle time after which an activation is collected, unless configured.
pub const DEFAULT_COLLECTION_AGE: Duration = Duration::from_secs(15 * 60);

struct Activation {
    grain: Arc<dyn Grain>,
    /// Milliseconds since the runtime's epoch.
    last_used: AtomicU64,
}

impl Activation {
    /// An activation is busy while a call holds a clone of its grain.
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.grain) > 1
    }
}

/// In-process runtime: activates grains lazily per (interface, key).
///
/// Activations idle for longer than the collection age are dropped. The
/// sweep runs on the activation path, at most once per half age, and never
/// drops a grain with a call in flight.
pub struct LocalRuntime {
    factories: HashMap<String, Factory>,
    activations: DashMap<GrainRef, Activation>,
    collection_age: Duration,
    epoch: Instant,
    last_sweep: AtomicU64,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            activations: DashMap::new(),
            collection_age: DEFAULT_COLLECTION_AGE,
            epoch: Instant::now(),
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Registers the factory activating grains of `interface`.
    pub fn register<F, G>(mut self, interface: &str, factory: F) -> Self
    where
        F: Fn(&GrainKey) -> G + Send + Sync + 'static,
        G: Grain + 'static,
    {
        let factory: Factory = Arc::new(move |key| Arc::new(factory(key)) as Arc<dyn Grain>);
        self.factories.insert(interface.to_owned(), factory);
        self
    }

    /// Sets how long an activation may sit idle before it is collected.
    pub fn collection_age(mut self, age: Duration) -> Self {
        self.collection_age = age;
        self
    }

    pub fn activation_count(&self) -> usize {
        self.activations.len()
    }

    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn activate(&self, grain: &GrainRef) -> Result<Arc<dyn Grain>, InvokeError> {
        let now = self.now();
        if let Some(active) = self.activations.get(grain) {
            active.last_used.store(now, Ordering::Relaxed);
            return Ok(Arc::clone(&active.grain));
        }
        let factory = self
            .factories
            .get(grain.interface())
            .ok_or_else(|| InvokeError::UnknownInterface(grain.interface().to_owned()))?;
        self.collect_idle(now);
        let active = self.activations.entry(grain.clone()).or_insert_with(|| {
            debug!(grain = %grain, "activating grain");
            Activation { grain: factory(grain.key()), last_used: AtomicU64::new(now) }
        });
        active.last_used.store(now, Ordering::Relaxed);
        Ok(Arc::clone(&active.grain))
    }

    fn collect_idle(&self, now: u64) {
        let age = u64::try_from(self.collection_age.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < age / 2 {
            return;
        }
        if self.last_sweep.compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed).is_err() {
            return;
        }

        let before = self.activations.len();
        self.activations
            .retain(|_, active| active.is_busy() || now.saturating_sub(active.last_used.load(Ordering::Relaxed)) < age);
        let collected = before.saturating_sub(self.activations.len());
        if collected > 0 {
            debug!(collected, remaining = self.activations.len(), "idle grains collected");
        }
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrainRuntime for LocalRuntime {
    fn reference(&self, interface: &str, key: GrainKey) -> GrainRef {
        GrainRef::new(interface, key)
    }

    async fn invoke(
        &self,
        grain: &GrainRef,
        method: &str,
        args: Vec<Value>,
        ctx: &CallContext,
    ) -> Result<Reply, InvokeError> {
        let active = self.activate(grain)?;
        active.call(method, args, ctx).await
    }
}

impl fmt::Debug for LocalRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("interfaces", &self.factories.keys().collect::<Vec<_>>())
            .field("activations", &self.activations.len())
            .field("collection_age", &self.collection_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct Counter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Grain for Counter {
        async fn call(&self, method: &str, _: Vec<Value>, _: &CallContext) -> Result<Reply, InvokeError> {
            match method {
                "Next" => Ok(json!(self.calls.fetch_add(1, Ordering::SeqCst) + 1).into()),
                other => Err(InvokeError::UnknownMethod { interface: "ICounter".into(), method: other.into() }),
            }
        }
    }

    fn runtime() -> LocalRuntime {
        LocalRuntime::new().register("ICounter", |_| Counter { calls: AtomicUsize::new(0) })
    }

    #[tokio::test]
    async fn one_activation_per_key() {
        let runtime = runtime();
        let a = runtime.reference("ICounter", GrainKey::Integer(1));
        let b = runtime.reference("ICounter", GrainKey::Integer(2));
        let ctx = CallContext::default();

        runtime.invoke(&a, "Next", vec![], &ctx).await.unwrap();
        let second = runtime.invoke(&a, "Next", vec![], &ctx).await.unwrap();
        let other = runtime.invoke(&b, "Next", vec![], &ctx).await.unwrap();

        assert_eq!(second, Reply::Value(json!(2)));
        assert_eq!(other, Reply::Value(json!(1)));
        assert_eq!(runtime.activation_count(), 2);
    }

    #[tokio::test]
    async fn idle_activations_are_collected() {
        let runtime = runtime().collection_age(Duration::ZERO);
        let ctx = CallContext::default();

        for id in 0..5 {
            let grain = runtime.reference("ICounter", GrainKey::Integer(id));
            runtime.invoke(&grain, "Next", vec![], &ctx).await.unwrap();
            assert_eq!(runtime.activation_count(), 1);
        }
    }

    #[tokio::test]
    async fn busy_activations_survive_collection() {
        let runtime = runtime().collection_age(Duration::ZERO);
        let held = runtime.activate(&runtime.reference("ICounter", GrainKey::Integer(1))).unwrap();

        let other = runtime.reference("ICounter", GrainKey::Integer(2));
        runtime.invoke(&other, "Next", vec![], &CallContext::default()).await.unwrap();
        assert_eq!(runtime.activation_count(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn unknown_interface_is_an_error() {
        let runtime = runtime();
        let grain = runtime.reference("INope", GrainKey::Integer(1));
        let err = runtime.invoke(&grain, "Next", vec![], &CallContext::default()).await.unwrap_err();
        assert!(matches!(err, InvokeError::UnknownInterface(name) if name == "INope"));
    }

    #[test]
    fn http_result_helpers_set_status() {
        assert_eq!(HttpResult::created().status, StatusCode::CREATED);
        assert_eq!(HttpResult::not_implemented().status, StatusCode::NOT_IMPLEMENTED);
        let result = HttpResult::ok().header("X-A", "1").body("done");
        assert_eq!(result.headers, vec![("X-A".to_owned(), "1".to_owned())]);
        assert_eq!(result.body, Some(json!("done")));
    }
}
