//! Per-request tracing span.
//!
//! Every request runs inside an `info` span named `request` carrying `method`
//! and `path`. `status` and `latency_ms` are recorded on the span when the
//! response is ready, and a completion event is emitted inside it.

use std::time::Instant;

use http::StatusCode;
use tracing::field::Empty;
use tracing::{Span, info, info_span};

pub(crate) struct RequestTrace {
    span: Span,
    started: Instant,
}

impl RequestTrace {
    pub(crate) fn start(method: &http::Method, path: &str) -> Self {
        let span = info_span!("request", method = %method, path = %path, status = Empty, latency_ms = Empty);
        Self { span, started: Instant::now() }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn finish(self, status: StatusCode) {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        self.span.record("status", status.as_u16());
        self.span.record("latency_ms", latency_ms);
        self.span.in_scope(|| info!(status = status.as_u16(), latency_ms, "request completed"));
    }
}
