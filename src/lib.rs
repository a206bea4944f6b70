// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod vision;

pub use api::{create_app, start_server, AppState, ModelSlot};
pub use config::{DetectorConfig, DetrArchitecture, ExecutionTarget, LabelSource, ServerConfig};
pub use vision::{Detection, DetectorError, ImageInput, PixelBuffer, SignDetector};
