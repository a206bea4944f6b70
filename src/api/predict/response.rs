// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Predict response types

use serde::{Deserialize, Serialize};

use crate::vision::Detection;

/// Serialized as a bare JSON array of detections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PredictResponse {
    pub detections: Vec<Detection>,
}

impl From<Vec<Detection>> for PredictResponse {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}
