// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detector configuration and label-set resolution

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::vision::errors::DetectorError;

/// Labels used when no configuration supplies a class list
pub const DEFAULT_CLASSES: [&str; 3] = ["hello", "iloveyou", "thankyou"];

/// Minimum class probability for a query to be reported
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Square input resolution of the network
pub const DEFAULT_INPUT_SIZE: u32 = 224;

pub const DEFAULT_CHECKPOINT_PATH: &str = "./checkpoints/104_model.safetensors";
pub const DEFAULT_BACKBONE_PATH: &str = "./checkpoints/resnet50_backbone.onnx";

/// Where the class label set comes from
///
/// Precedence is encoded by the variant chosen by the caller: an explicit
/// list wins over a JSON file, which wins over the built-in default. A
/// label file that does not exist or has no `classes` key falls back to
/// [`DEFAULT_CLASSES`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LabelSource {
    /// Explicit in-memory list
    Classes(Vec<String>),
    /// JSON file shaped `{"classes": [...]}`
    File(PathBuf),
    /// `["hello", "iloveyou", "thankyou"]`
    #[default]
    Default,
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    #[serde(default)]
    classes: Option<Vec<String>>,
}

fn default_classes() -> Vec<String> {
    DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect()
}

impl LabelSource {
    /// Pick a label source from optional CLI-style inputs
    ///
    /// An explicit class list takes priority over a config file path.
    pub fn from_options(classes: Option<Vec<String>>, file: Option<PathBuf>) -> Self {
        match (classes, file) {
            (Some(classes), _) => LabelSource::Classes(classes),
            (None, Some(path)) => LabelSource::File(path),
            (None, None) => LabelSource::Default,
        }
    }

    /// Resolve the ordered label list
    pub fn resolve(&self) -> Result<Vec<String>, DetectorError> {
        let labels = match self {
            LabelSource::Classes(classes) => classes.clone(),
            LabelSource::File(path) => Self::read_label_file(path)?,
            LabelSource::Default => default_classes(),
        };

        if labels.is_empty() {
            return Err(DetectorError::LabelConfig(
                "class list must not be empty".to_string(),
            ));
        }

        debug!("Resolved {} class labels: {:?}", labels.len(), labels);
        Ok(labels)
    }

    fn read_label_file(path: &Path) -> Result<Vec<String>, DetectorError> {
        if !path.exists() {
            warn!(
                "Label config {} not found, using default classes",
                path.display()
            );
            return Ok(default_classes());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::LabelConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let parsed: LabelFile = serde_json::from_str(&contents).map_err(|e| {
            DetectorError::LabelConfig(format!("invalid JSON in {}: {}", path.display(), e))
        })?;

        Ok(parsed.classes.unwrap_or_else(default_classes))
    }
}

/// Device the backbone runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionTarget {
    #[default]
    Cpu,
    /// CUDA with automatic CPU fallback
    Cuda,
}

impl FromStr for ExecutionTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ExecutionTarget::Cpu),
            "cuda" | "gpu" => Ok(ExecutionTarget::Cuda),
            other => Err(format!(
                "unknown execution target '{}', expected 'cpu' or 'cuda'",
                other
            )),
        }
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::Cpu => write!(f, "cpu"),
            ExecutionTarget::Cuda => write!(f, "cuda"),
        }
    }
}

/// Hyperparameters of the detection transformer
#[derive(Debug, Clone, PartialEq)]
pub struct DetrArchitecture {
    pub hidden_dim: usize,
    pub num_heads: usize,
    pub num_queries: usize,
    pub num_encoder_layers: usize,
    pub num_decoder_layers: usize,
    /// Width of the feed-forward block in each transformer layer
    pub ffn_dim: usize,
    /// Channels produced by the backbone trunk (2048 for ResNet-50)
    pub backbone_channels: usize,
    pub layer_norm_eps: f32,
}

impl Default for DetrArchitecture {
    fn default() -> Self {
        Self {
            hidden_dim: 256,
            num_heads: 8,
            num_queries: 25,
            num_encoder_layers: 1,
            num_decoder_layers: 1,
            ffn_dim: 2048,
            backbone_channels: 2048,
            layer_norm_eps: 1e-5,
        }
    }
}

/// Everything needed to construct a [`SignDetector`](crate::vision::SignDetector)
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// safetensors file with the detection head parameters
    pub checkpoint_path: PathBuf,
    /// ONNX export of the ResNet-50 trunk
    pub backbone_path: PathBuf,
    pub labels: LabelSource,
    pub target: ExecutionTarget,
    pub confidence_threshold: f32,
    pub input_size: u32,
    pub architecture: DetrArchitecture,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            backbone_path: PathBuf::from(DEFAULT_BACKBONE_PATH),
            labels: LabelSource::Default,
            target: ExecutionTarget::Cpu,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            architecture: DetrArchitecture::default(),
        }
    }
}

impl DetectorConfig {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            ..Default::default()
        }
    }

    pub fn with_backbone(mut self, backbone_path: impl Into<PathBuf>) -> Self {
        self.backbone_path = backbone_path.into();
        self
    }

    pub fn with_labels(mut self, labels: LabelSource) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_target(mut self, target: ExecutionTarget) -> Self {
        self.target = target;
        self
    }

    /// Set the confidence threshold (clamped to [0, 1])
    ///
    /// NaN is kept as given and rejected by [`DetectorConfig::validate`].
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_architecture(mut self, architecture: DetrArchitecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Reject settings no detector can run with
    pub fn validate(&self) -> Result<(), DetectorError> {
        let threshold = self.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(DetectorError::InvalidThreshold(threshold));
        }
        Ok(())
    }
}
