//! Minimal graingate example: a greeting grain and a counter grain behind
//! one gateway, on the in-memory runtime.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/grains/IHelloGrain/6f9619ff-8b86-d011-b42d-00c04fc964ff/Greet?name=ada'
//!   curl -X POST http://localhost:3000/grains/counter/7/add \
//!        -H 'content-type: application/json' -d '5'
//!   curl http://localhost:3000/grains/counter/7
//!   curl http://localhost:3000/_routes
//!   curl http://localhost:3000/healthz

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use graingate::{
    CallContext, Gateway, GatewayConfig, Grain, GrainInterface, HttpResult, InterfaceDescriptor, InvokeError,
    KeyMarker, LocalRuntime, MethodDescriptor, ParamDescriptor, ParamType, Reply, ReturnShape, Server,
};
use serde_json::{Value, json};

// ── Hello ─────────────────────────────────────────────────────────────────────

struct HelloGrain;

impl GrainInterface for HelloGrain {
    fn describe() -> InterfaceDescriptor {
        InterfaceDescriptor::new("IHelloGrain").key(KeyMarker::Guid).method(
            MethodDescriptor::new("Greet")
                .get("")
                .param(ParamDescriptor::query("name", ParamType::String))
                .returns(ReturnShape::Value),
        )
    }
}

#[async_trait]
impl Grain for HelloGrain {
    async fn call(&self, _method: &str, args: Vec<Value>, _ctx: &CallContext) -> Result<Reply, InvokeError> {
        let name = args.first().and_then(Value::as_str).unwrap_or("stranger");
        Ok(json!({ "greeting": format!("hello, {name}") }).into())
    }
}

// ── Counter ───────────────────────────────────────────────────────────────────

struct CounterGrain {
    value: AtomicI64,
}

impl GrainInterface for CounterGrain {
    fn describe() -> InterfaceDescriptor {
        InterfaceDescriptor::new("ICounterGrain")
            .route_prefix("counter")
            .key(KeyMarker::Integer)
            .method(MethodDescriptor::new("Get").get("{id}").returns(ReturnShape::Value))
            .method(
                MethodDescriptor::new("Add")
                    .post("{id}/add")
                    .param(ParamDescriptor::body("amount", ParamType::Long).required())
                    .returns(ReturnShape::Wrapped),
            )
    }
}

#[async_trait]
impl Grain for CounterGrain {
    async fn call(&self, method: &str, args: Vec<Value>, _ctx: &CallContext) -> Result<Reply, InvokeError> {
        match method {
            "Get" => Ok(json!(self.value.load(Ordering::SeqCst)).into()),
            "Add" => {
                let amount = args.first().and_then(Value::as_i64).unwrap_or_default();
                let value = self.value.fetch_add(amount, Ordering::SeqCst) + amount;
                Ok(HttpResult::accepted().header("x-counter", value.to_string()).body(json!(value)).into())
            }
            other => Err(InvokeError::UnknownMethod { interface: "ICounterGrain".into(), method: other.into() }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), graingate::Error> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig {
        bind: "0.0.0.0:3000".into(),
        prefix: "grains".into(),
        request_timeout_ms: Some(5_000),
        ..GatewayConfig::default()
    };

    let runtime = LocalRuntime::new()
        .register("IHelloGrain", |_| HelloGrain)
        .register("ICounterGrain", |_| CounterGrain { value: AtomicI64::new(0) });

    let gateway = Gateway::builder(config.clone(), Arc::new(runtime))
        .grain::<HelloGrain>()
        .grain::<CounterGrain>()
        .build()?;

    Server::from_config(&config)?.serve(gateway).await
}
