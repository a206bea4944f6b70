// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;
use tracing::info;

use super::DetectorArgs;
use crate::api::http_server::{start_server, AppState};
use crate::config::server::{DEFAULT_HOST, DEFAULT_PORT};
use crate::config::ServerConfig;
use crate::vision::SignDetector;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "SIGN_DETR_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SIGN_DETR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

/// Load the detector once and serve until shutdown
///
/// A detector that fails to load does not stop the server: `/health`
/// reports `model_loaded: false` and `/predict` answers 500.
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = args.detector.to_config();
    info!("Loading model from {}...", config.checkpoint_path.display());

    let load_config = config.clone();
    let loaded = tokio::task::spawn_blocking(move || SignDetector::new(&load_config)).await?;
    let state = AppState::from_load_result(loaded);

    let server = ServerConfig {
        host: args.host,
        port: args.port,
    };
    start_server(&server, state).await
}
