// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the detection pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or running the sign detector
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Checkpoint not found at {0}")]
    CheckpointNotFound(PathBuf),

    #[error("Backbone model not found at {0}")]
    BackboneNotFound(PathBuf),

    #[error("Failed to read checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("Checkpoint is missing parameter '{0}'")]
    MissingParameter(String),

    #[error("Checkpoint contains unexpected parameter '{0}'")]
    UnexpectedParameter(String),

    #[error("Shape mismatch for '{name}': expected {expected:?}, found {found:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Parameter '{name}' has unsupported dtype {dtype} (expected F32)")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Invalid label configuration: {0}")]
    LabelConfig(String),

    #[error("Label set has {labels} entries but the class head predicts {classes} classes")]
    LabelCountMismatch { labels: usize, classes: usize },

    #[error("Confidence threshold must be a number in [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("Architecture mismatch: {0}")]
    Architecture(String),

    #[error("Positional embedding dimension must be even, got {0}")]
    OddEmbeddingDim(usize),

    #[error("Could not read image from {path}: {message}")]
    UnreadableImage { path: PathBuf, message: String },

    #[error("Unsupported image input: {0}")]
    UnsupportedInput(String),

    #[error("Backbone inference failed: {0:#}")]
    Backbone(#[from] anyhow::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl DetectorError {
    /// True for errors caused by the caller's image rather than the model
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DetectorError::UnreadableImage { .. } | DetectorError::UnsupportedInput(_)
        )
    }
}
