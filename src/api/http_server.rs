// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::errors::ApiError;
use super::predict::predict_handler;
use crate::config::ServerConfig;
use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::{DetectorError, SignDetector};

/// Largest accepted request body: a base64 image of `MAX_IMAGE_SIZE`
/// decoded bytes plus room for the data-URI header and JSON framing
pub const MAX_REQUEST_BODY: usize = MAX_IMAGE_SIZE.div_ceil(3) * 4 + 64 * 1024;

/// Outcome of constructing the detector at startup
#[derive(Debug, Clone)]
pub enum ModelSlot {
    Ready(Arc<SignDetector>),
    /// Construction failed; the reason is kept for logs
    Failed(String),
}

/// Shared state handed to every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub model: ModelSlot,
}

impl AppState {
    pub fn ready(detector: SignDetector) -> Self {
        Self {
            model: ModelSlot::Ready(Arc::new(detector)),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            model: ModelSlot::Failed(reason.into()),
        }
    }

    /// Wrap the result of detector construction, logging a failure
    pub fn from_load_result(result: Result<SignDetector, DetectorError>) -> Self {
        match result {
            Ok(detector) => {
                info!("✅ Model loaded successfully");
                Self::ready(detector)
            }
            Err(e) => {
                error!("❌ Failed to load model: {}", e);
                Self::failed(e.to_string())
            }
        }
    }

    pub fn model_loaded(&self) -> bool {
        matches!(self.model, ModelSlot::Ready(_))
    }

    pub fn detector(&self) -> Result<Arc<SignDetector>, ApiError> {
        match &self.model {
            ModelSlot::Ready(detector) => Ok(Arc::clone(detector)),
            ModelSlot::Failed(reason) => Err(ApiError::ModelNotLoaded(reason.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Build the router: `/predict`, `/health`, permissive CORS, request tracing
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let model_loaded = state.model_loaded();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "🚀 Sign detection server listening on {} (model loaded: {})",
        addr, model_loaded
    );

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.model_loaded(),
    })
}
