// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! GET /health

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use sign_detr::api::http_server::{create_app, AppState, HealthResponse};
use tower::ServiceExt; // for `oneshot`

use crate::common::{detector, Weights};

async fn get_health(state: AppState) -> (StatusCode, HealthResponse) {
    let app = create_app(state);
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_with_loaded_model() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::ready(detector(dir.path(), Weights::Zero));

    let (status, health) = get_health(state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");
    assert!(health.model_loaded);
}

#[tokio::test]
async fn test_health_without_model() {
    let state = AppState::failed("Checkpoint not found at ./checkpoints/104_model.safetensors");

    let (status, health) = get_health(state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");
    assert!(!health.model_loaded);
}

#[tokio::test]
async fn test_health_exact_shape() {
    let app = create_app(AppState::failed("not loaded"));
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"status": "ok", "model_loaded": false}));
}
