// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection transformer
//!
//! A convolutional trunk feeds a single encoder/decoder attention stack with
//! a fixed set of learned object queries. Each query produces one class
//! distribution (including a "no object" slot) and one normalized box.
//!
//! ```text
//! image [1,3,224,224] -> trunk [1,2048,7,7] -> conv 1x1 [49,d]
//!   src = norm_src(tokens + sincos_pos)      tgt = norm_tgt(query_pos)
//!   hidden = decoder(tgt, encoder(src))      [queries,d]
//!   logits = linear_class(hidden)            boxes = sigmoid(linear_bbox(hidden))
//! ```

pub mod backbone;
pub mod checkpoint;
pub mod heads;
pub mod layers;
pub mod position;
pub mod transformer;

use ndarray::{Array2, Array4, Axis};
use tracing::{debug, info};

use crate::config::DetrArchitecture;
use crate::vision::errors::DetectorError;
use backbone::{FeatureExtractor, Projection};
use checkpoint::Checkpoint;
use heads::PredictionHeads;
use layers::LayerNorm;
use position::build_2d_sincos_position_embedding;
use transformer::AttentionStack;

pub use backbone::OnnxBackbone;
pub use checkpoint::save_checkpoint;

/// Raw per-query predictions for one image
#[derive(Debug, Clone, PartialEq)]
pub struct DetrOutput {
    /// [queries, classes + 1]
    pub logits: Array2<f32>,
    /// [queries, 4] normalized (cx, cy, w, h)
    pub boxes: Array2<f32>,
}

/// Everything after the trunk: projection, attention stack and heads
#[derive(Debug, Clone)]
pub struct DetrHead {
    projection: Projection,
    norm_src: LayerNorm,
    norm_tgt: LayerNorm,
    query_pos: Array2<f32>,
    transformer: AttentionStack,
    heads: PredictionHeads,
    hidden_dim: usize,
}

impl DetrHead {
    /// Build the head from a checkpoint, requiring every parameter to be used
    pub fn from_checkpoint(
        mut checkpoint: Checkpoint,
        arch: &DetrArchitecture,
        num_classes: usize,
    ) -> Result<Self, DetectorError> {
        if num_classes == 0 {
            return Err(DetectorError::Architecture(
                "at least one class is required".to_string(),
            ));
        }

        let d = arch.hidden_dim;
        let eps = arch.layer_norm_eps;

        let projection = Projection::load(&mut checkpoint, arch.backbone_channels, d)?;
        let norm_src = LayerNorm::load(&mut checkpoint, "norm_src", d, eps)?;
        let norm_tgt = LayerNorm::load(&mut checkpoint, "norm_tgt", d, eps)?;
        let query_pos = checkpoint.take_2d("query_pos", arch.num_queries, d)?;
        let transformer = AttentionStack::load(&mut checkpoint, arch)?;
        let heads = PredictionHeads::load(&mut checkpoint, d, num_classes)?;

        checkpoint.finish()?;

        info!(
            "✅ Detection head ready: {} queries, {} classes, hidden {}",
            arch.num_queries, num_classes, d
        );

        Ok(Self {
            projection,
            norm_src,
            norm_tgt,
            query_pos,
            transformer,
            heads,
            hidden_dim: d,
        })
    }

    pub fn num_queries(&self) -> usize {
        self.query_pos.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.heads.num_classes()
    }

    /// Run on a trunk feature map [1, C, H, W]
    pub fn forward(&self, features: &Array4<f32>) -> Result<DetrOutput, DetectorError> {
        let (batch, channels, height, width) = features.dim();
        if batch != 1 {
            return Err(DetectorError::Architecture(format!(
                "expected a single image, got batch of {}",
                batch
            )));
        }
        if channels != self.projection.in_channels() {
            return Err(DetectorError::Architecture(format!(
                "backbone produced {} channels, projection expects {}",
                channels,
                self.projection.in_channels()
            )));
        }

        let tokens = self.projection.forward(features)?;
        let pos = build_2d_sincos_position_embedding(height, width, self.hidden_dim)?;
        let src = self.norm_src.forward(&(tokens + &pos.index_axis(Axis(0), 0)));
        let tgt = self.norm_tgt.forward(&self.query_pos);

        debug!("Encoding {} tokens ({}x{})", src.nrows(), height, width);

        let hidden = self.transformer.forward(&src, &tgt);
        let (logits, boxes) = self.heads.forward(&hidden);
        Ok(DetrOutput { logits, boxes })
    }
}

/// Trunk plus head
pub struct DetrModel {
    backbone: Box<dyn FeatureExtractor>,
    head: DetrHead,
}

impl std::fmt::Debug for DetrModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetrModel")
            .field("backbone_channels", &self.backbone.out_channels())
            .field("head", &self.head)
            .finish()
    }
}

impl DetrModel {
    pub fn new(backbone: Box<dyn FeatureExtractor>, head: DetrHead) -> Result<Self, DetectorError> {
        if backbone.out_channels() != head.projection.in_channels() {
            return Err(DetectorError::Architecture(format!(
                "backbone emits {} channels but the head expects {}",
                backbone.out_channels(),
                head.projection.in_channels()
            )));
        }
        Ok(Self { backbone, head })
    }

    pub fn head(&self) -> &DetrHead {
        &self.head
    }

    /// image: [1, 3, H, W] normalized tensor
    pub fn forward(&self, image: &Array4<f32>) -> Result<DetrOutput, DetectorError> {
        let features = self.backbone.extract(image)?;
        self.head.forward(&features)
    }
}

/// Every head parameter name with its expected shape
///
/// Useful for exporting or synthesizing checkpoints that [`DetrHead`] will
/// accept.
pub fn parameter_shapes(arch: &DetrArchitecture, num_classes: usize) -> Vec<(String, Vec<usize>)> {
    let d = arch.hidden_dim;
    let ffn = arch.ffn_dim;
    let mut shapes = vec![
        ("conv.weight".to_string(), vec![d, arch.backbone_channels, 1, 1]),
        ("conv.bias".to_string(), vec![d]),
        ("norm_src.weight".to_string(), vec![d]),
        ("norm_src.bias".to_string(), vec![d]),
        ("norm_tgt.weight".to_string(), vec![d]),
        ("norm_tgt.bias".to_string(), vec![d]),
        ("query_pos".to_string(), vec![arch.num_queries, d]),
    ];

    let attention = |shapes: &mut Vec<(String, Vec<usize>)>, prefix: String| {
        shapes.push((format!("{prefix}.in_proj_weight"), vec![3 * d, d]));
        shapes.push((format!("{prefix}.in_proj_bias"), vec![3 * d]));
        shapes.push((format!("{prefix}.out_proj.weight"), vec![d, d]));
        shapes.push((format!("{prefix}.out_proj.bias"), vec![d]));
    };
    let feed_forward = |shapes: &mut Vec<(String, Vec<usize>)>, prefix: &str| {
        shapes.push((format!("{prefix}.linear1.weight"), vec![ffn, d]));
        shapes.push((format!("{prefix}.linear1.bias"), vec![ffn]));
        shapes.push((format!("{prefix}.linear2.weight"), vec![d, ffn]));
        shapes.push((format!("{prefix}.linear2.bias"), vec![d]));
    };
    let norm = |shapes: &mut Vec<(String, Vec<usize>)>, prefix: String| {
        shapes.push((format!("{prefix}.weight"), vec![d]));
        shapes.push((format!("{prefix}.bias"), vec![d]));
    };

    for i in 0..arch.num_encoder_layers {
        let prefix = format!("transformer.encoder.layers.{i}");
        attention(&mut shapes, format!("{prefix}.self_attn"));
        feed_forward(&mut shapes, &prefix);
        norm(&mut shapes, format!("{prefix}.norm1"));
        norm(&mut shapes, format!("{prefix}.norm2"));
    }
    norm(&mut shapes, "transformer.encoder.norm".to_string());

    for i in 0..arch.num_decoder_layers {
        let prefix = format!("transformer.decoder.layers.{i}");
        attention(&mut shapes, format!("{prefix}.self_attn"));
        attention(&mut shapes, format!("{prefix}.multihead_attn"));
        feed_forward(&mut shapes, &prefix);
        norm(&mut shapes, format!("{prefix}.norm1"));
        norm(&mut shapes, format!("{prefix}.norm2"));
        norm(&mut shapes, format!("{prefix}.norm3"));
    }
    norm(&mut shapes, "transformer.decoder.norm".to_string());

    shapes.push(("linear_class.weight".to_string(), vec![num_classes + 1, d]));
    shapes.push(("linear_class.bias".to_string(), vec![num_classes + 1]));
    shapes.push(("linear_bbox.weight".to_string(), vec![4, d]));
    shapes.push(("linear_bbox.bias".to_string(), vec![4]));

    shapes
}
