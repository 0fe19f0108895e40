//! CurlFetcher against a local axum server
//!
//! Skipped when no `curl` binary is on PATH.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use std::collections::BTreeMap;
use vizreg_loaders::{CurlFetcher, ResourceFetcher};

fn curl_available() -> bool {
    std::process::Command::new("curl")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], "body { color: red; }")
}

async fn private(headers: HeaderMap) -> impl IntoResponse {
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value == "Basic dXNlcjpwYXNz" => (StatusCode::OK, "secret").into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn serve() -> String {
    let app = Router::new()
        .route("/a.css", get(stylesheet))
        .route("/moved.css", get(|| async { Redirect::temporary("/a.css") }))
        .route("/empty.png", get(|| async { StatusCode::OK }))
        .route("/private.txt", get(private));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_body_and_content_type() {
    if !curl_available() {
        return;
    }
    let base = serve().await;
    let fetcher = CurlFetcher::new();

    let response = fetcher
        .fetch(&format!("{}/a.css", base), &BTreeMap::new())
        .await
        .expect("stylesheet fetched");
    assert_eq!(response.body, b"body { color: red; }");
    assert_eq!(response.content_type.as_deref(), Some("text/css"));
}

#[tokio::test]
async fn test_follows_redirects() {
    if !curl_available() {
        return;
    }
    let base = serve().await;

    let response = CurlFetcher::new()
        .fetch(&format!("{}/moved.css", base), &BTreeMap::new())
        .await
        .expect("redirect followed");
    assert_eq!(response.body, b"body { color: red; }");
}

#[tokio::test]
async fn test_failures_are_none() {
    if !curl_available() {
        return;
    }
    let base = serve().await;
    let fetcher = CurlFetcher::new();
    let headers = BTreeMap::new();

    assert!(fetcher.fetch(&format!("{}/missing.css", base), &headers).await.is_none());
    assert!(fetcher.fetch(&format!("{}/empty.png", base), &headers).await.is_none());
    // Nothing listens on port 9 locally
    assert!(fetcher.fetch("http://127.0.0.1:9/a.css", &headers).await.is_none());
}

#[tokio::test]
async fn test_request_headers_forwarded() {
    if !curl_available() {
        return;
    }
    let base = serve().await;
    let url = format!("{}/private.txt", base);
    let fetcher = CurlFetcher::new();

    assert!(fetcher.fetch(&url, &BTreeMap::new()).await.is_none());

    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string());
    let response = fetcher.fetch(&url, &headers).await.expect("authorized");
    assert_eq!(response.body, b"secret");
}
