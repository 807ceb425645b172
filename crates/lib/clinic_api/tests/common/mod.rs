//! Shared helpers for router integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use clinic_api::AppState;
use clinic_api::config::ApiConfig;
use clinic_api::services::directory::DEMO_PASSWORD;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";

/// State with one seeded account per role.
pub fn seeded_state() -> AppState {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let state = AppState::new(ApiConfig::with_secret(SECRET));
    state
        .directory
        .seed_demo_accounts()
        .expect("seed demo accounts");
    state
}

pub fn app(state: &AppState) -> Router {
    clinic_api::router(state.clone())
}

/// Send a request and decode the JSON body (Null when empty).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

/// Log in a seeded account and return the token response body.
pub async fn login(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(serde_json::json!({"email": email, "password": DEMO_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
}

pub fn access_token(body: &Value) -> String {
    body["access_token"].as_str().expect("access_token").to_string()
}
