// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::DetectorArgs;
use crate::vision::SignDetector;

/// Arguments for the predict command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to analyse
    pub image: PathBuf,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

pub async fn run(args: PredictArgs) -> Result<()> {
    let config = args.detector.to_config();
    let image = args.image;

    let detections = tokio::task::spawn_blocking(move || -> Result<_> {
        let detector = SignDetector::new(&config).context("Failed to load detector")?;
        detector
            .predict_path(&image)
            .with_context(|| format!("Prediction failed for {}", image.display()))
    })
    .await??;

    info!("{} detections", detections.len());
    println!("{}", serde_json::to_string_pretty(&detections)?);
    Ok(())
}
