// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod predict;
pub mod serve;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{
    detector::{DEFAULT_BACKBONE_PATH, DEFAULT_CHECKPOINT_PATH},
    DetectorConfig, ExecutionTarget, LabelSource, DEFAULT_CONFIDENCE_THRESHOLD,
};

/// Sign language detection service
#[derive(Parser, Debug)]
#[command(name = "sign-detr")]
#[command(version)]
#[command(about = "Detect sign-language gestures with a detection transformer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP prediction server
    Serve(serve::ServeArgs),

    /// Detect signs in a single image and print JSON
    Predict(predict::PredictArgs),
}

/// Options shared by every command that builds a detector
#[derive(Args, Debug, Clone)]
pub struct DetectorArgs {
    /// safetensors checkpoint with the detection head
    #[arg(long, env = "SIGN_DETR_CHECKPOINT", default_value = DEFAULT_CHECKPOINT_PATH)]
    pub checkpoint: PathBuf,

    /// ONNX export of the ResNet-50 trunk
    #[arg(long, env = "SIGN_DETR_BACKBONE", default_value = DEFAULT_BACKBONE_PATH)]
    pub backbone: PathBuf,

    /// JSON label file shaped {"classes": [...]}
    #[arg(long, env = "SIGN_DETR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated class labels (overrides --config)
    #[arg(long, env = "SIGN_DETR_CLASSES", value_delimiter = ',')]
    pub classes: Option<Vec<String>>,

    /// Execution target for the backbone (cpu or cuda)
    #[arg(long, env = "SIGN_DETR_DEVICE", default_value = "cpu")]
    pub device: ExecutionTarget,

    /// Minimum class probability to report a detection
    #[arg(
        long,
        env = "SIGN_DETR_THRESHOLD",
        default_value_t = DEFAULT_CONFIDENCE_THRESHOLD,
        value_parser = parse_threshold
    )]
    pub threshold: f32,
}

impl DetectorArgs {
    pub fn to_config(&self) -> DetectorConfig {
        DetectorConfig::new(&self.checkpoint)
            .with_backbone(&self.backbone)
            .with_labels(LabelSource::from_options(
                self.classes.clone(),
                self.config.clone(),
            ))
            .with_target(self.device)
            .with_confidence_threshold(self.threshold)
    }
}

fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold: f32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !threshold.is_finite() {
        return Err(format!("threshold must be finite, got {}", value));
    }
    Ok(threshold)
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Predict(args) => predict::run(args).await,
    }
}
