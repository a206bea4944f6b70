// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sign-language detection pipeline
//!
//! This module provides:
//! - Image decoding and input normalization (paths, pixel buffers, base64)
//! - The detection transformer (ONNX trunk + attention head)
//! - Post-processing into labelled pixel-space boxes

pub mod detector;
pub mod detr;
pub mod errors;
pub mod image_utils;
pub mod input;
pub mod postprocess;
pub mod preprocessing;

pub use detector::SignDetector;
pub use detr::backbone::FeatureExtractor;
pub use errors::DetectorError;
pub use image_utils::{decode_base64_image, decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use input::{ChannelOrder, ImageInput, PixelBuffer};
pub use postprocess::Detection;
pub use preprocessing::Preprocessor;
