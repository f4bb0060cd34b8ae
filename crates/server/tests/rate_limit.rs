//! HTTP-level tests for the rate limiting middleware.
//!
//! Drives a minimal router through `tower::ServiceExt::oneshot`; no database
//! or session layer is involved, so clients are keyed by forwarded IP.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use miorah_server::config::RateLimitStrategy;
use miorah_server::middleware::{RateLimiter, rate_limit_middleware};

fn app(limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .layer(from_fn_with_state(limiter, rate_limit_middleware))
}

fn request(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/ping")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn returns_429_once_limit_is_exceeded() {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitStrategy::FixedWindow,
        2,
        Duration::from_secs(60),
    ));
    let app = app(limiter);

    for _ in 0..2 {
        let response = app.clone().oneshot(request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(request("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["ratelimit-remaining"], "0");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "rate_limited");
    assert!(json["retry_after"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn successful_responses_carry_rate_limit_headers() {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitStrategy::FixedWindow,
        5,
        Duration::from_secs(60),
    ));
    let app = app(limiter);

    let response = app.clone().oneshot(request("10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["ratelimit-limit"], "5");
    assert_eq!(response.headers()["ratelimit-remaining"], "4");
    assert!(response.headers().contains_key("ratelimit-reset"));

    // Legacy header names mirror the standard ones
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");

    let response = app.clone().oneshot(request("10.0.0.2")).await.unwrap();
    assert_eq!(response.headers()["ratelimit-remaining"], "3");
}

#[tokio::test]
async fn clients_are_limited_independently() {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitStrategy::FixedWindow,
        1,
        Duration::from_secs(60),
    ));
    let app = app(limiter);

    let first = app.clone().oneshot(request("10.0.0.3")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let blocked = app.clone().oneshot(request("10.0.0.3")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.clone().oneshot(request("10.0.0.4")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_bucket_allows_initial_burst() {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitStrategy::TokenBucket,
        3,
        Duration::from_secs(60),
    ));
    let app = app(limiter);

    for _ in 0..3 {
        let response = app.clone().oneshot(request("10.0.0.5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(request("10.0.0.5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
