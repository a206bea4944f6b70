// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vision::{DetectorError, ImageError};

/// JSON error payload, `{"error": "...", "error_type": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    /// Request body was not the expected JSON
    InvalidRequest(String),
    /// `image` field absent or empty
    MissingImage,
    /// `image` present but not a decodable picture
    InvalidImage(String),
    /// Detector failed to construct at startup
    ModelNotLoaded(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, error) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone()),
            ApiError::MissingImage => ("missing_image", "No image provided".to_string()),
            ApiError::InvalidImage(msg) => {
                ("invalid_image", format!("Failed to decode image: {}", msg))
            }
            ApiError::ModelNotLoaded(_) => ("model_not_loaded", "Model not loaded".to_string()),
            ApiError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        ErrorResponse {
            error,
            error_type: error_type.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::MissingImage | ApiError::InvalidImage(_) => 400,
            ApiError::ModelNotLoaded(_) | ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::MissingImage => write!(f, "No image provided"),
            ApiError::InvalidImage(msg) => write!(f, "Failed to decode image: {}", msg),
            ApiError::ModelNotLoaded(reason) => write!(f, "Model not loaded: {}", reason),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::EmptyData => ApiError::MissingImage,
            other => ApiError::InvalidImage(other.to_string()),
        }
    }
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        if err.is_input_error() {
            ApiError::InvalidImage(err.to_string())
        } else {
            ApiError::InternalError(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
