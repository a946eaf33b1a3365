//! Method invocation and response writing.
//!
//! The invoker awaits the grain call, racing it against the request's
//! cancellation token, and turns the [`Reply`] into a [`Response`]:
//!
//! | return shape / reply | response                                          |
//! |----------------------|---------------------------------------------------|
//! | none, or `Unit`      | `200`, empty body                                 |
//! | `Value`              | `200`, value serialized with the negotiated type  |
//! | `Http`               | its status and headers; its body, if any, as above|
//!
//! A value with no codec for the negotiated type is written as plain text.

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use serde_json::Value;
use tracing::warn;

use crate::descriptor::{MethodDescriptor, ReturnShape};
use crate::media::{MediaTypeRegistry, TEXT};
use crate::response::{Response, ResponseBuilder};
use crate::runtime::{CallContext, GrainRef, GrainRuntime, HttpResult, InvokeError, Reply};

/// Calls `method` on `grain` and writes the reply in `media_type`.
pub async fn invoke(
    runtime: &dyn GrainRuntime,
    grain: &GrainRef,
    method: &MethodDescriptor,
    args: Vec<Value>,
    ctx: &CallContext,
    media: &MediaTypeRegistry,
    media_type: &str,
) -> Result<Response, InvokeError> {
    let reply = tokio::select! {
        biased;
        () = ctx.cancellation.cancelled() => return Err(InvokeError::Cancelled),
        reply = runtime.invoke(grain, method.name(), args, ctx) => reply?,
    };

    let response = match (method.return_shape(), reply) {
        (ReturnShape::None, _) | (_, Reply::Unit) => Response::status(StatusCode::OK),
        (_, Reply::Value(value))                  => write_value(Response::builder(), &value, media, media_type),
        (_, Reply::Http(result))                  => write_result(result, media, media_type),
    };
    Ok(response)
}

fn write_result(result: HttpResult, media: &MediaTypeRegistry, media_type: &str) -> Response {
    let mut builder = Response::builder().status(result.status);
    for (name, value) in &result.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    match &result.body {
        Some(body) => write_value(builder, body, media, media_type),
        None => builder.no_body(),
    }
}

fn write_value(builder: ResponseBuilder, value: &Value, media: &MediaTypeRegistry, media_type: &str) -> Response {
    let mut sink = Vec::new();
    if media.serialize(media_type, value, &mut sink) {
        return builder.bytes(media_type, sink);
    }
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    builder.bytes(TEXT, text.into_bytes())
}
