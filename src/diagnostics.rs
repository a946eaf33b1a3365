//! Route table snapshot served as JSON on `diagnostics_path`.

use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::response::Response;
use crate::table::{RouteSnapshot, RouteTable};

#[derive(Serialize)]
struct Diagnostics {
    generated_at: String,
    count: usize,
    routes: Vec<RouteSnapshot>,
}

pub(crate) fn routes(table: &RouteTable) -> Response {
    let report = Diagnostics {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        count: table.len(),
        routes: table.snapshot(),
    };
    match serde_json::to_vec(&report) {
        Ok(body) => Response::json(body),
        Err(e) => {
            error!(error = %e, "failed to serialize route table");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
