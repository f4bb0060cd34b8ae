//! HTTP-level tests for the CSRF middleware.
//!
//! No session layer is mounted, so tokens are keyed by forwarded IP.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header::COOKIE},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use miorah_server::middleware::{CSRF_COOKIE, CSRF_HEADER, CsrfProtect, csrf_middleware};

const SECRET: &[u8] = b"test-hmac-secret-key-0123456789abcdef";
const TTL: Duration = Duration::from_secs(3600);

fn protect(double_submit: bool, exempt_paths: Vec<String>) -> Arc<CsrfProtect> {
    Arc::new(CsrfProtect::new(SECRET, TTL, double_submit, exempt_paths))
}

fn app(csrf: Arc<CsrfProtect>) -> Router {
    Router::new()
        .route("/resource", get(|| async { "read" }).post(|| async { "written" }))
        .route("/webhooks/payment", post(|| async { "hook" }))
        .layer(from_fn_with_state(csrf, csrf_middleware))
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "10.0.0.1")
}

async fn error_code(response: axum::response::Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    json["error"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn safe_methods_pass_without_a_token() {
    let app = app(protect(false, vec![]));

    let response = app
        .oneshot(
            request(Method::GET, "/resource")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn post_without_token_is_forbidden() {
    let app = app(protect(false, vec![]));

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_missing");
}

#[tokio::test]
async fn post_with_bogus_token_is_forbidden() {
    let app = app(protect(false, vec![]));

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, "not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_invalid");
}

#[tokio::test]
async fn issued_token_is_accepted() {
    let csrf = protect(false, vec![]);
    let token = csrf.issue("ip:10.0.0.1");
    let app = app(csrf);

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_issued_to_another_client_is_rejected() {
    let csrf = protect(false, vec![]);
    let token = csrf.issue("ip:192.168.1.50");
    let app = app(csrf);

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_invalid");
}

#[tokio::test]
async fn direct_connections_are_keyed_by_socket_address() {
    let csrf = protect(false, vec![]);
    let token_a = csrf.issue("ip:10.1.1.1");
    let token_b = csrf.issue("ip:10.2.2.2");
    let addr_a: SocketAddr = "10.1.1.1:40000".parse().unwrap();

    // No proxy headers; the key falls back to the socket address.
    let post_from_a = |token: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/resource")
            .extension(ConnectInfo(addr_a))
            .header(CSRF_HEADER, token)
            .body(Body::empty())
            .unwrap()
    };

    let response = app(Arc::clone(&csrf))
        .oneshot(post_from_a(token_a))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Another client's token must not validate for this address.
    let response = app(csrf).oneshot(post_from_a(token_b)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_invalid");
}

#[tokio::test]
async fn exempt_path_bypasses_validation() {
    let app = app(protect(false, vec!["/webhooks".to_owned()]));

    let response = app
        .oneshot(
            request(Method::POST, "/webhooks/payment")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn double_submit_accepts_matching_pair() {
    let app = app(protect(true, vec![]));

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, "the-token")
                .header(COOKIE, format!("{CSRF_COOKIE}=the-token"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn double_submit_rejects_mismatched_pair() {
    let app = app(protect(true, vec![]));

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, "header-token")
                .header(COOKIE, format!("{CSRF_COOKIE}=cookie-token"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_invalid");
}

#[tokio::test]
async fn double_submit_requires_the_cookie() {
    let app = app(protect(true, vec![]));

    let response = app
        .oneshot(
            request(Method::POST, "/resource")
                .header(CSRF_HEADER, "header-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "csrf_missing");
}
