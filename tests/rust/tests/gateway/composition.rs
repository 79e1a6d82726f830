//! Tests for route composition: exact routes registered before mounts,
//! optional OAuth mount, and the introspection endpoint.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

use tests::{start_gateway, test_oauth_router};

#[tokio::test(flavor = "multi_thread")]
async fn health_returns_exact_payload() {
    let gateway = start_gateway(None).await;

    let body: Value = reqwest::get(format!("{}/health", gateway.url))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body");

    assert_eq!(body, json!({ "ok": true }));
    gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_not_shadowed_by_mounts() {
    let temp = TempDir::new().unwrap();
    let oauth = test_oauth_router(
        "https://provider.example.com/authorize",
        "https://provider.example.com/token",
        "http://test.local/oauth/auth/callback",
        &temp.path().join("oauth_tokens.json"),
    );
    let gateway = start_gateway(Some(oauth)).await;

    // Both mounts are live, yet the exact routes still answer.
    let health: Value = reqwest::get(format!("{}/health", gateway.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "ok": true }));

    let debug = reqwest::get(format!("{}/debug/info", gateway.url))
        .await
        .unwrap();
    assert_eq!(debug.status(), 200);

    gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_routes_absent_when_not_configured() {
    let gateway = start_gateway(None).await;

    let response = reqwest::get(format!("{}/oauth/auth/status", gateway.url))
        .await
        .expect("status request");
    assert_eq!(response.status(), 404);

    gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_routes_present_when_configured() {
    let temp = TempDir::new().unwrap();
    let oauth = test_oauth_router(
        "https://provider.example.com/authorize",
        "https://provider.example.com/token",
        "http://test.local/oauth/auth/callback",
        &temp.path().join("oauth_tokens.json"),
    );
    let gateway = start_gateway(Some(oauth)).await;

    let body: Value = reqwest::get(format!("{}/oauth/auth/status", gateway.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "authorized": false }));

    gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn debug_info_reflects_upstream_identity() {
    let gateway = start_gateway(None).await;

    let body: Value = reqwest::get(format!("{}/debug/info", gateway.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["upstream"]["name"], "stub-upstream");
    assert_eq!(body["upstream"]["version"], "0.9.0");
    assert_eq!(body["oauth_enabled"], false);
    let routes = body["routes"].as_array().expect("routes array");
    assert!(routes.iter().any(|r| r == "/mcp"));
    assert!(!routes.iter().any(|r| r == "/oauth"));

    gateway.shutdown().await;
}
