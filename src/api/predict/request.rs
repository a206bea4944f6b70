// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Predict request types and validation

use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;
use crate::vision::image_utils::strip_data_uri;

/// Body of POST /predict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Base64 image, optionally prefixed with a `data:image/...;base64,` header
    #[serde(default)]
    pub image: Option<String>,
}

impl PredictRequest {
    /// Returns the image payload, rejecting an absent or blank field
    pub fn validate(&self) -> Result<&str, ApiError> {
        match self.image.as_deref() {
            Some(image) if !strip_data_uri(image).is_empty() => Ok(image),
            _ => Err(ApiError::MissingImage),
        }
    }
}
