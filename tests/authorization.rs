mod common;

use common::{GUID, empty, gateway, json, request};
use graingate::Response;
use http::StatusCode;
use serde_json::json;

async fn call(uri: &str, token: Option<&str>) -> Response {
    let mut builder = request("GET", uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    gateway().handle(empty(builder)).await
}

#[tokio::test]
async fn admin_role_is_required() {
    let uri = format!("/grains/test/{GUID}/admin");

    assert_eq!(call(&uri, None).await.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(call(&uri, Some("unknown-token")).await.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(call(&uri, Some("user-token")).await.status_code(), StatusCode::FORBIDDEN);

    let response = call(&uri, Some("admin-token")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(json(&response), json!("secret"));
}

#[tokio::test]
async fn named_policies_gate_access() {
    let uri = format!("/grains/test/{GUID}/staff");

    assert_eq!(call(&uri, Some("admin-token")).await.status_code(), StatusCode::FORBIDDEN);

    let response = call(&uri, Some("user-token")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(json(&response), json!("bob"));
}

#[tokio::test]
async fn unsecured_routes_ignore_credentials() {
    let uri = format!("/grains/test/{GUID}/get2");
    assert_eq!(call(&uri, None).await.status_code(), StatusCode::OK);
    assert_eq!(call(&uri, Some("garbage")).await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn authorization_runs_before_key_resolution() {
    let response = call("/grains/test/not-a-guid/admin", None).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
