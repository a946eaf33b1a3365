//! Built-in Kubernetes health-check responses.
//!
//! Kubernetes asks two questions. The gateway answers them on the paths set
//! by `health_path` and `readiness_path`.
//!
//! | Probe | Default path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Readiness flips to `503` once shutdown starts, so the pod leaves the
//! load-balancer while in-flight requests drain.

use http::StatusCode;

use crate::response::Response;

/// Always `200 OK` with body `"ok"`.
pub(crate) fn liveness() -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`, or `503` when the gateway is draining.
pub(crate) fn readiness(ready: bool) -> Response {
    if ready {
        Response::text("ready")
    } else {
        Response::status(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_follows_the_flag() {
        assert_eq!(readiness(true).body().as_ref(), b"ready");
        assert_eq!(readiness(false).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(liveness().status_code(), StatusCode::OK);
    }
}
