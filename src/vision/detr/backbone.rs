// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Convolutional trunk and input projection
//!
//! The ResNet-50 trunk (everything up to the last residual stage) runs as an
//! ONNX model. Its [1, 2048, H/32, W/32] feature map is then reduced to the
//! transformer width by a 1x1 convolution whose weights live in the head
//! checkpoint.

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Array4, Axis, Ix4};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::checkpoint::Checkpoint;
use crate::config::ExecutionTarget;
use crate::vision::errors::DetectorError;

/// Produces a spatial feature map from a preprocessed image tensor
#[cfg_attr(test, mockall::automock)]
pub trait FeatureExtractor: Send + Sync {
    /// [1, 3, H, W] -> [1, C, H', W']
    fn extract(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Channel count C of the produced feature map
    fn out_channels(&self) -> usize;
}

/// ResNet trunk exported to ONNX
pub struct OnnxBackbone {
    session: Arc<Mutex<Session>>,
    input_name: String,
    out_channels: usize,
}

impl std::fmt::Debug for OnnxBackbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackbone")
            .field("input_name", &self.input_name)
            .field("out_channels", &self.out_channels)
            .finish()
    }
}

impl OnnxBackbone {
    /// Load the trunk, trying CUDA first when requested
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        target: ExecutionTarget,
        out_channels: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            anyhow::bail!("Backbone model not found: {}", model_path.display());
        }

        info!("Loading backbone from {} (target: {})", model_path.display(), target);

        let session = match target {
            ExecutionTarget::Cuda => match Self::cuda_session(model_path) {
                Ok(session) => {
                    info!("✅ CUDA execution provider initialized");
                    session
                }
                Err(e) => {
                    warn!("⚠️  CUDA execution provider failed: {:#}", e);
                    warn!("   Falling back to CPU execution provider");
                    Self::cpu_session(model_path)?
                }
            },
            ExecutionTarget::Cpu => Self::cpu_session(model_path)?,
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input".to_string());

        debug!("Backbone input tensor: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            out_channels,
        })
    }

    fn cuda_session(model_path: &Path) -> Result<Session> {
        Ok(Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)?)
    }

    fn cpu_session(model_path: &Path) -> Result<Session> {
        Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load backbone model from {}",
                model_path.display()
            ))
    }
}

impl FeatureExtractor for OnnxBackbone {
    fn extract(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Backbone session lock poisoned"))?;

        let input_value =
            Value::from_array(input.to_owned()).context("Failed to create input tensor")?;
        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Backbone inference failed")?;

        let features = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract feature tensor")?
            .to_owned()
            .into_dimensionality::<Ix4>()
            .context("Backbone output is not a 4-D feature map")?;

        debug!("Backbone feature map shape: {:?}", features.shape());
        Ok(features)
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}

/// Residual blocks per stage of ResNet-50
const RESNET50_STAGES: [usize; 4] = [3, 4, 6, 3];
const BOTTLENECK_EXPANSION: usize = 4;

/// Every `backbone.*` parameter of the ResNet-50 trunk with its shape
///
/// Names follow the torchvision state dict with `fc` replaced by identity,
/// so the list covers `conv1`, `bn1` and the four bottleneck stages.
/// Batch-norm counters (`num_batches_tracked`) are scalars.
pub fn resnet50_trunk_shapes() -> Vec<(String, Vec<usize>)> {
    fn batch_norm(shapes: &mut Vec<(String, Vec<usize>)>, prefix: &str, channels: usize) {
        for field in ["weight", "bias", "running_mean", "running_var"] {
            shapes.push((format!("{prefix}.{field}"), vec![channels]));
        }
        shapes.push((format!("{prefix}.num_batches_tracked"), vec![]));
    }

    let mut shapes = vec![("backbone.conv1.weight".to_string(), vec![64, 3, 7, 7])];
    batch_norm(&mut shapes, "backbone.bn1", 64);

    let mut in_planes = 64;
    for (stage, &blocks) in RESNET50_STAGES.iter().enumerate() {
        let planes = 64 << stage;
        let out_planes = planes * BOTTLENECK_EXPANSION;
        for block in 0..blocks {
            let prefix = format!("backbone.layer{}.{}", stage + 1, block);
            shapes.push((format!("{prefix}.conv1.weight"), vec![planes, in_planes, 1, 1]));
            batch_norm(&mut shapes, &format!("{prefix}.bn1"), planes);
            shapes.push((format!("{prefix}.conv2.weight"), vec![planes, planes, 3, 3]));
            batch_norm(&mut shapes, &format!("{prefix}.bn2"), planes);
            shapes.push((format!("{prefix}.conv3.weight"), vec![out_planes, planes, 1, 1]));
            batch_norm(&mut shapes, &format!("{prefix}.bn3"), out_planes);
            if block == 0 {
                shapes.push((
                    format!("{prefix}.downsample.0.weight"),
                    vec![out_planes, in_planes, 1, 1],
                ));
                batch_norm(&mut shapes, &format!("{prefix}.downsample.1"), out_planes);
            }
            in_planes = out_planes;
        }
    }

    shapes
}

/// 1x1 convolution from backbone channels to the transformer width
#[derive(Debug, Clone)]
pub struct Projection {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Projection {
    pub fn load(
        checkpoint: &mut Checkpoint,
        in_channels: usize,
        hidden_dim: usize,
    ) -> Result<Self, DetectorError> {
        let weight = checkpoint
            .take("conv.weight", &[hidden_dim, in_channels, 1, 1])?
            .into_shape_with_order((hidden_dim, in_channels))?;
        let bias = checkpoint.take_1d("conv.bias", hidden_dim)?;
        Ok(Self { weight, bias })
    }

    pub fn in_channels(&self) -> usize {
        self.weight.ncols()
    }

    /// [1, C, H, W] -> tokens [H*W, d] in row-major (y, x) order
    pub fn forward(&self, features: &Array4<f32>) -> Result<Array2<f32>, DetectorError> {
        let (_, channels, height, width) = features.dim();
        let flat = features
            .index_axis(Axis(0), 0)
            .to_owned()
            .into_shape_with_order((channels, height * width))?;
        Ok(flat.t().dot(&self.weight.t()) + &self.bias)
    }
}
