use httpmock::prelude::*;
use mapprep::adapters::proxy::{router, ProxyState};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn spawn_server(upstream: &str, api_key: Option<&str>, static_dir: &Path) -> SocketAddr {
    let state = ProxyState::new(upstream, api_key.map(String::from), Duration::from_secs(5)).unwrap();
    let app = router(Arc::new(state), static_dir);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_proxy_passes_status_and_body() {
    let upstream = MockServer::start();
    let search = upstream.mock(|when, then| {
        when.method(GET)
            .path("/search/companies")
            .query_param("q", "tesco")
            .header("Authorization", "Basic c2VjcmV0Og==")
            .header("Accept", "application/json");
        then.status(200)
            .header("Content-Type", "application/json;charset=utf-8")
            .body(r#"{"items":[{"title":"TESCO PLC"}]}"#);
    });
    let missing = upstream.mock(|when, then| {
        when.method(GET).path("/company/00000000");
        then.status(404).body(r#"{"errors":[{"error":"company-profile-not-found"}]}"#);
    });

    let static_dir = TempDir::new().unwrap();
    let addr = spawn_server(&upstream.base_url(), Some("secret"), static_dir.path()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/ch/search/companies?q=tesco&items_per_page=1", addr))
        .send()
        .await
        .unwrap();
    search.assert();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["content-type"], "application/json;charset=utf-8");
    assert_eq!(response.text().await.unwrap(), r#"{"items":[{"title":"TESCO PLC"}]}"#);

    let response = client
        .get(format!("http://{}/ch/company/00000000", addr))
        .send()
        .await
        .unwrap();
    missing.assert();
    assert_eq!(response.status(), 404);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.text().await.unwrap().contains("company-profile-not-found"));
}

#[tokio::test]
async fn test_bare_prefix_is_proxied() {
    let upstream = MockServer::start();
    let root = upstream.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body(r#"{"ok":true}"#);
    });

    let static_dir = TempDir::new().unwrap();
    std::fs::create_dir(static_dir.path().join("ch")).unwrap();
    std::fs::write(static_dir.path().join("ch/index.html"), "static").unwrap();
    let addr = spawn_server(&upstream.base_url(), Some("secret"), static_dir.path()).await;

    let response = reqwest::get(format!("http://{}/ch/", addr)).await.unwrap();
    root.assert();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), r#"{"ok":true}"#);
}

#[tokio::test]
async fn test_missing_key_is_500() {
    let upstream = MockServer::start();
    let never = upstream.mock(|when, then| {
        when.method(GET);
        then.status(200);
    });

    let static_dir = TempDir::new().unwrap();
    let addr = spawn_server(&upstream.base_url(), None, static_dir.path()).await;

    let response = reqwest::get(format!("http://{}/ch/search/companies?q=x", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"error": "CH_API_KEY env var not set"}));
    never.assert_hits(0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    // Nothing listens on the discard port of localhost.
    let static_dir = TempDir::new().unwrap();
    let addr = spawn_server("http://127.0.0.1:9", Some("secret"), static_dir.path()).await;

    let response = reqwest::get(format!("http://{}/ch/company/123", addr)).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upstream failed");
    assert!(body["detail"].as_str().is_some_and(|d| !d.is_empty()));
}

#[tokio::test]
async fn test_static_files_served() {
    let static_dir = TempDir::new().unwrap();
    std::fs::write(static_dir.path().join("index.html"), "<h1>map</h1>").unwrap();
    let addr = spawn_server("http://127.0.0.1:9", Some("secret"), static_dir.path()).await;

    let response = reqwest::get(format!("http://{}/index.html", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>map</h1>");

    let response = reqwest::get(format!("http://{}/nope.html", addr)).await.unwrap();
    assert_eq!(response.status(), 404);
}
