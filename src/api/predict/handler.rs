// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Predict endpoint handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::request::PredictRequest;
use super::response::PredictResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::decode_base64_image;

/// POST /predict - Detect signs in a base64 image
///
/// # Request
/// - `image`: base64 image data, a `data:` URI prefix is accepted (required)
///
/// # Response
/// JSON array of `{label, confidence, box: [x1, y1, x2, y2]}` in pixel
/// coordinates of the submitted image. Empty when nothing is detected.
///
/// # Errors
/// - 400 Bad Request: body is not JSON, image missing or undecodable
/// - 500 Internal Server Error: model not loaded or inference failed
pub async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    // 1. Model must have loaded at startup
    let detector = state.detector()?;

    // 2. Parse and validate body
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected predict body: {}", rejection.body_text());
        ApiError::InvalidRequest(rejection.body_text())
    })?;
    let image_data = request.validate()?.to_string();

    // 3. Decode and run inference off the async runtime
    let start = Instant::now();
    let detections = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let (image, info) = decode_base64_image(&image_data).map_err(|e| {
            warn!("Failed to decode image: {}", e);
            ApiError::from(e)
        })?;
        debug!(
            "Decoded image: {}x{} {:?}, {} bytes",
            info.width, info.height, info.format, info.size_bytes
        );

        detector.predict(&image).map_err(|e| {
            warn!("Prediction error: {}", e);
            ApiError::from(e)
        })
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("prediction task failed: {}", e)))??;

    info!(
        "Prediction complete: {} detections in {}ms",
        detections.len(),
        start.elapsed().as_millis()
    );

    Ok(Json(PredictResponse::from(detections)))
}
