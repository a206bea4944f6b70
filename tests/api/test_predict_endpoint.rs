// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /predict: success paths and every error status

use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sign_detr::api::http_server::{create_app, AppState, MAX_REQUEST_BODY};
use sign_detr::api::ErrorResponse;
use sign_detr::vision::Detection;
use tower::ServiceExt; // for `oneshot`

use crate::common::{detector, encode_png, noise_image, solid_image, split_image, Weights};

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(state: AppState, req: Request<Body>) -> (StatusCode, Bytes) {
    let app = create_app(state);
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

fn loaded_state(weights: Weights) -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::ready(detector(dir.path(), weights));
    (dir, state)
}

fn error_of(body: &[u8]) -> ErrorResponse {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_predict_with_data_uri() {
    let (_dir, state) = loaded_state(Weights::Favour(0));
    let encoded = STANDARD.encode(encode_png(&split_image(200, 100)));
    let body = serde_json::json!({ "image": format!("data:image/png;base64,{}", encoded) });

    let (status, body) = send(state, predict_request(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let detections: Vec<Detection> = serde_json::from_slice(&body).unwrap();
    assert_eq!(detections.len(), 5);
    for d in &detections {
        assert_eq!(d.label, "hello");
        assert_eq!(d.bbox, [50.0, 25.0, 150.0, 75.0]);
    }

    // wire format uses "box"
    let raw: serde_json::Value = serde_json::from_slice(&serde_json::to_vec(&detections).unwrap()).unwrap();
    assert!(raw[0].get("box").is_some());
}

#[tokio::test]
async fn test_predict_plain_base64_blank_image() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let encoded = STANDARD.encode(encode_png(&solid_image(64, 64, [0, 0, 0])));
    let body = serde_json::json!({ "image": encoded });

    let (status, body) = send(state, predict_request(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"[]");
}

#[tokio::test]
async fn test_predict_large_photo() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let png = encode_png(&noise_image(1100, 900, 7));
    let encoded = STANDARD.encode(&png);
    // beyond axum's 2 MiB default body limit
    assert!(encoded.len() > 3 * 1024 * 1024);

    let body = serde_json::json!({ "image": format!("data:image/png;base64,{}", encoded) });
    let (status, body) = send(state, predict_request(body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"[]");
}

#[tokio::test]
async fn test_body_over_limit_rejected() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let body = format!(r#"{{"image": "{}"}}"#, "A".repeat(MAX_REQUEST_BODY));

    let (status, body) = send(state, predict_request(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&body).error_type, "invalid_request");
}

#[tokio::test]
async fn test_missing_image_field() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let (status, body) = send(state, predict_request("{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&body).error, "No image provided");
}

#[tokio::test]
async fn test_empty_image_field() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let (status, body) = send(state, predict_request(r#"{"image": ""}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&body).error_type, "missing_image");
}

#[tokio::test]
async fn test_invalid_base64() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let (status, body) = send(state, predict_request(r#"{"image": "!!!not-base64!!!"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = error_of(&body);
    assert_eq!(error.error_type, "invalid_image");
    assert!(error.error.starts_with("Failed to decode image"));
}

#[tokio::test]
async fn test_base64_of_non_image() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let encoded = STANDARD.encode(b"this is definitely not a picture");
    let body = serde_json::json!({ "image": encoded });

    let (status, body) = send(state, predict_request(body.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&body).error_type, "invalid_image");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let (status, body) = send(state, predict_request("{\"image\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_of(&body).error_type, "invalid_request");
}

#[tokio::test]
async fn test_wrong_image_type() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let (status, body) = send(state, predict_request(r#"{"image": 42}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_of(&body).error.is_empty());
}

#[tokio::test]
async fn test_model_not_loaded() {
    let state = AppState::failed("Checkpoint not found at ./checkpoints/104_model.safetensors");
    let encoded = STANDARD.encode(encode_png(&solid_image(8, 8, [255, 255, 255])));
    let body = serde_json::json!({ "image": encoded });

    let (status, body) = send(state, predict_request(body.to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_of(&body).error, "Model not loaded");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let (_dir, state) = loaded_state(Weights::Zero);
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/predict")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let app = create_app(state);
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_bad_request_does_not_poison_state() {
    let (_dir, state) = loaded_state(Weights::Favour(1));

    let (status, _) = send(state.clone(), predict_request("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let encoded = STANDARD.encode(encode_png(&solid_image(32, 32, [10, 200, 10])));
    let body = serde_json::json!({ "image": encoded });
    let (status, body) = send(state, predict_request(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let detections: Vec<Detection> = serde_json::from_slice(&body).unwrap();
    assert!(detections.iter().all(|d| d.label == "iloveyou"));
}
