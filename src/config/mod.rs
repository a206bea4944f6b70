// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detector;
pub mod server;

pub use detector::{
    DetectorConfig, DetrArchitecture, ExecutionTarget, LabelSource, DEFAULT_CLASSES,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE,
};
pub use server::ServerConfig;
