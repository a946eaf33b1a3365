//! The per-request pipeline.
//!
//! Strict order: match → authorize → resolve → bind → invoke → write.
//! Each step either hands over to the next or ends the request with a
//! status:
//!
//! | step      | failure                                    | status        |
//! |-----------|--------------------------------------------|---------------|
//! | match     | no template                                | 404           |
//! | match     | template exists under other verbs          | 405 + `Allow` |
//! | match     | route value is not UTF-8 once decoded      | 400           |
//! | authorize | see [`middleware::auth`](crate::middleware::auth) | 401 / 403 |
//! | resolve   | malformed key / no reference / fault       | 400 / set / 500 |
//! | body      | payload unreadable                         | 400           |
//! | bind      | required parameter unreadable              | 400           |
//! | invoke    | grain fault                                | 500           |
//! | any       | request deadline passed                    | 504           |
//!
//! Every request owns a [`CancellationToken`]. Dropping the dispatch future
//! (the client went away) cancels it through a drop guard; the deadline
//! cancels it explicitly. The token reaches body collection and the grain
//! call.

use std::fmt;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use hyper::body::Body;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::diagnostics;
use crate::gateway::Shared;
use crate::health;
use crate::invoker;
use crate::method::Verb;
use crate::middleware::auth::authorize;
use crate::request::{BodyError, RequestContext, collect_body};
use crate::resolver::ResolveContext;
use crate::response::Response;
use crate::runtime::{CallContext, InvokeError};
use crate::table::{RouteEntry, RouteMatch};

pub(crate) async fn dispatch<B>(shared: &Shared, request: http::Request<B>) -> Response
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    if parts.method == Method::GET {
        if let Some(response) = builtin(shared, path) {
            return response;
        }
    }

    let (entry, params) = match shared.table.lookup(&parts.method, path) {
        RouteMatch::Found { entry, params } => (entry, params),
        RouteMatch::NotAllowed(verbs) => return not_allowed(&verbs),
        RouteMatch::NotFound => return Response::status(StatusCode::NOT_FOUND),
        RouteMatch::Undecodable => {
            debug!(path, "route value is not valid UTF-8");
            return Response::status(StatusCode::BAD_REQUEST);
        }
    };
    debug!(template = entry.template(), verb = %entry.verb(), "route matched");

    let principal = shared
        .authenticator
        .as_ref()
        .and_then(|authenticator| authenticator.authenticate(&parts.headers));
    if let Some(requirement) = entry.authorization() {
        if let Err(e) = authorize(requirement, principal.as_ref(), &shared.policies) {
            info!(error = %e, "request not authorized");
            return Response::status(e.status());
        }
    }

    let cancellation = CancellationToken::new();
    let _cancel_on_drop = cancellation.clone().drop_guard();

    let mut ctx = RequestContext::new(
        path.to_owned(),
        parts.uri.query(),
        parts.headers,
        params,
        cancellation.clone(),
    );
    ctx.principal = principal;

    let work = run(shared, entry, ctx, body);
    match shared.config.request_timeout() {
        None => work.await,
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(response) => response,
            Err(_) => {
                cancellation.cancel();
                warn!(timeout_ms = limit.as_millis() as u64, "request deadline passed");
                Response::status(StatusCode::GATEWAY_TIMEOUT)
            }
        },
    }
}

async fn run<B>(shared: &Shared, entry: &RouteEntry, mut ctx: RequestContext, body: B) -> Response
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    let Some(resolver) = shared.resolvers.get(entry.policy()) else {
        error!(policy = entry.policy(), "resolver policy vanished after build");
        return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let mut resolution = ResolveContext::new(ctx.params(), entry.scheme(), &shared.tokens, shared.runtime.as_ref());
    let grain = match resolver.resolve(entry.interface(), &mut resolution).await {
        Ok(Some(grain)) => grain,
        Ok(None) => {
            let status = resolution.status().unwrap_or(StatusCode::BAD_REQUEST);
            if status.is_server_error() {
                error!(policy = entry.policy(), interface = entry.interface().name(), "resolver produced no grain reference");
            } else {
                warn!(policy = entry.policy(), interface = entry.interface().name(), status = status.as_u16(), "no grain reference for request");
            }
            return Response::status(status);
        }
        Err(e) => {
            let status = resolution.status().unwrap_or_else(|| e.status());
            if status.is_server_error() {
                error!(policy = entry.policy(), error = %e, "grain reference resolution failed");
            } else {
                warn!(policy = entry.policy(), error = %e, "grain reference rejected");
            }
            return Response::status(status);
        }
    };

    if entry.plan().needs_body() {
        match collect_body(body, &ctx.cancellation).await {
            Ok(bytes) => ctx.body = bytes,
            Err(BodyError::Cancelled) => return cancelled(),
            Err(e) => {
                warn!(error = %e, "request body unreadable");
                return Response::status(StatusCode::BAD_REQUEST);
            }
        }
    }

    let args = match entry.plan().bind(&ctx, &shared.media, &shared.config.default_media_type) {
        Ok(args) => args,
        Err(e) => {
            warn!(error = %e, "parameter binding failed");
            return Response::status(StatusCode::BAD_REQUEST);
        }
    };

    let media_type = shared.media.negotiate(ctx.accept(), ctx.content_type(), &shared.config.default_media_type);
    let call = CallContext { principal: ctx.principal.clone(), cancellation: ctx.cancellation.clone() };

    match invoker::invoke(shared.runtime.as_ref(), &grain, entry.method(), args, &call, &shared.media, &media_type).await {
        Ok(response) => response,
        Err(InvokeError::Cancelled) => cancelled(),
        Err(e) => {
            error!(grain = %grain, method = entry.method().name(), error = %e, "grain invocation failed");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn builtin(shared: &Shared, path: &str) -> Option<Response> {
    let config = &shared.config;
    if config.health_path.as_deref() == Some(path) {
        Some(health::liveness())
    } else if config.readiness_path.as_deref() == Some(path) {
        Some(health::readiness(shared.ready.load(std::sync::atomic::Ordering::Acquire)))
    } else if config.diagnostics_path.as_deref() == Some(path) {
        Some(diagnostics::routes(&shared.table))
    } else {
        None
    }
}

fn not_allowed(verbs: &[Verb]) -> Response {
    let allow = verbs.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ");
    let builder = Response::builder().status(StatusCode::METHOD_NOT_ALLOWED);
    match HeaderValue::from_str(&allow) {
        Ok(value) => builder.header(ALLOW, value).no_body(),
        Err(_) => builder.no_body(),
    }
}

/// The client is gone or the deadline wrapper already answered; this
/// response is never written.
fn cancelled() -> Response {
    debug!("request cancelled");
    Response::status(StatusCode::GATEWAY_TIMEOUT)
}
