#![allow(dead_code)]

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use graingate::middleware::auth::StaticTokens;
use graingate::{
    AuthorizationRequirement, CallContext, Gateway, GatewayBuilder, GatewayConfig, Grain, GrainKey, GrainRef, HttpResult,
    InterfaceDescriptor, InvokeError, KeyMarker, LocalRuntime, MethodDescriptor, ParamDescriptor, ParamType, Principal,
    RANDOM_POLICY, Reply, ResolveContext, ResolveError, ResolveReference, Response, ReturnShape, RouteDecl, Verb,
};
use http_body_util::Full;
use hyper::body::{Body, Frame};
use serde_json::{Value, json};

pub const GUID: &str = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

/// One grain type answering every method of the test interfaces.
pub struct TestGrain {
    key: GrainKey,
}

#[async_trait]
impl Grain for TestGrain {
    async fn call(&self, method: &str, args: Vec<Value>, ctx: &CallContext) -> Result<Reply, InvokeError> {
        let first = args.first().cloned().unwrap_or(Value::Null);
        match method {
            "Get"     => Ok(Reply::Unit),
            "Get2"    => Ok(json!("Get2").into()),
            "Get3"    => Ok(first.into()),
            "Echo"    => Ok(HttpResult::created().header("CustomHeader", "HeaderValue").body(first).into()),
            "Query"   => Ok(Value::Array(args).into()),
            "Form"    => Ok(first.into()),
            "Whoami"  => Ok(json!(self.key.to_string()).into()),
            "SameUrl" => Ok(json!("SameUrl").into()),
            "Admin"   => Ok(json!("secret").into()),
            "Staff"   => Ok(json!(ctx.principal.as_ref().map(|p| p.name.clone())).into()),
            "Slow"    => {
                ctx.cancellation.cancelled().await;
                Ok(Reply::Unit)
            }
            "Fail"    => Err(InvokeError::Fault("the grain fell over".to_owned())),
            other     => Err(InvokeError::UnknownMethod { interface: "ITestGrain".into(), method: other.into() }),
        }
    }
}

/// Resolves nothing and sets no status.
pub struct FailingResolver;

#[async_trait]
impl ResolveReference for FailingResolver {
    async fn resolve(&self, _: &InterfaceDescriptor, _: &mut ResolveContext<'_>) -> Result<Option<GrainRef>, ResolveError> {
        Ok(None)
    }
}

/// Resolves nothing, with an explicit status.
pub struct TeapotResolver;

#[async_trait]
impl ResolveReference for TeapotResolver {
    async fn resolve(&self, _: &InterfaceDescriptor, ctx: &mut ResolveContext<'_>) -> Result<Option<GrainRef>, ResolveError> {
        ctx.set_status(http::StatusCode::IM_A_TEAPOT);
        Ok(None)
    }
}

pub fn test_interface() -> InterfaceDescriptor {
    let value = |name: &str, verb: Verb, pattern: &str| {
        MethodDescriptor::new(name).route(RouteDecl::new(verb, pattern)).returns(ReturnShape::Value)
    };

    InterfaceDescriptor::new("ITestGrain")
        .route_prefix("Test")
        .key(KeyMarker::Guid)
        .method(MethodDescriptor::new("Get").get("{grainId}/Get"))
        .method(value("Get2", Verb::Get, "{grainId}/Get2"))
        .method(value("Get3", Verb::Get, "{grainId}/Get3/{hello}").param(ParamDescriptor::route("hello", ParamType::String)))
        .method(
            MethodDescriptor::new("Echo")
                .post("{grainId}/Echo")
                .param(ParamDescriptor::body("payload", ParamType::Json))
                .returns(ReturnShape::Wrapped),
        )
        .method(
            value("Query", Verb::Get, "{grainId}/Query")
                .param(ParamDescriptor::query("count", ParamType::Int).required())
                .param(ParamDescriptor::query("name", ParamType::String)),
        )
        .method(value("Form", Verb::Post, "{grainId}/Form").param(ParamDescriptor::body("form", ParamType::Map)))
        .method(value("Whoami", Verb::Get, "{grainId}/Whoami"))
        .method(value("SameUrl", Verb::Get, "{grainId}/SameUrl").post("{grainId}/SameUrl"))
        .method(value("Fail", Verb::Get, "{grainId}/Fail"))
        .method(value("Slow", Verb::Get, "{grainId}/Slow"))
        .method(MethodDescriptor::new("Failing").route(RouteDecl::new(Verb::Get, "{grainId}/Failing").policy("failing")))
        .method(MethodDescriptor::new("Teapot").route(RouteDecl::new(Verb::Get, "{grainId}/Teapot").policy("teapot")))
        .method(
            MethodDescriptor::new("Whoami")
                .route(RouteDecl::new(Verb::Get, "{grainId}/Stateless").policy(RANDOM_POLICY))
                .returns(ReturnShape::Value),
        )
        .method(value("Admin", Verb::Get, "{grainId}/Admin").authorize(AuthorizationRequirement::roles(["admin"])))
        .method(value("Staff", Verb::Get, "{grainId}/Staff").authorize(AuthorizationRequirement::policy("staff")))
}

pub fn region_interface() -> InterfaceDescriptor {
    InterfaceDescriptor::new("IRegionGrain")
        .route_prefix("Region")
        .key(KeyMarker::IntegerCompound)
        .method(
            MethodDescriptor::new("Whoami")
                .get("{grainId}/Whoami")
                .get("{grainId}/{idExtension}/Whoami")
                .returns(ReturnShape::Value),
        )
}

pub fn config() -> GatewayConfig {
    GatewayConfig {
        prefix: "grains".to_owned(),
        id_token: "grainId".to_owned(),
        request_timeout_ms: Some(250),
        ..GatewayConfig::default()
    }
}

pub fn builder() -> GatewayBuilder {
    let runtime = LocalRuntime::new()
        .register("ITestGrain", |key: &GrainKey| TestGrain { key: key.clone() })
        .register("IRegionGrain", |key: &GrainKey| TestGrain { key: key.clone() });

    Gateway::builder(config(), Arc::new(runtime))
        .interface(test_interface())
        .interface(region_interface())
        .resolver("failing", FailingResolver)
        .resolver("teapot", TeapotResolver)
        .authenticator(
            StaticTokens::new()
                .token("admin-token", Principal::new("ada").role("admin"))
                .token("user-token", Principal::new("bob").role("user")),
        )
        .policy("staff", |p: &Principal| p.name == "bob")
}

pub fn gateway() -> Gateway {
    builder().build().expect("test gateway builds")
}

pub fn request(method: &str, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

pub fn empty(builder: http::request::Builder) -> http::Request<Full<Bytes>> {
    builder.body(Full::new(Bytes::new())).expect("valid request")
}

pub fn with_body(builder: http::request::Builder, content_type: &str, body: &str) -> http::Request<Full<Bytes>> {
    builder
        .header("content-type", content_type)
        .body(Full::new(Bytes::copy_from_slice(body.as_bytes())))
        .expect("valid request")
}

/// A request body that never yields a frame.
pub struct Stalled;

impl Body for Stalled {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Pending
    }
}

pub async fn get(gateway: &Gateway, uri: &str) -> Response {
    gateway.handle(empty(request("GET", uri))).await
}

pub fn json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).expect("json body")
}
