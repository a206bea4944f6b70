// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-query classification and box regression heads

use ndarray::Array2;

use super::checkpoint::Checkpoint;
use super::layers::Linear;
use crate::vision::errors::DetectorError;

#[derive(Debug, Clone)]
pub struct PredictionHeads {
    class: Linear,
    bbox: Linear,
}

impl PredictionHeads {
    /// Load `linear_class` (C + 1 outputs, last is "no object") and `linear_bbox`
    pub fn load(
        checkpoint: &mut Checkpoint,
        hidden_dim: usize,
        num_classes: usize,
    ) -> Result<Self, DetectorError> {
        Ok(Self {
            class: Linear::load(checkpoint, "linear_class", hidden_dim, num_classes + 1)?,
            bbox: Linear::load(checkpoint, "linear_bbox", hidden_dim, 4)?,
        })
    }

    /// Number of real classes (excludes the no-object slot)
    pub fn num_classes(&self) -> usize {
        self.class.out_dim() - 1
    }

    /// hidden: [queries, d] -> (logits [queries, C + 1], boxes [queries, 4])
    ///
    /// Boxes are normalized (cx, cy, w, h) squashed into (0, 1).
    pub fn forward(&self, hidden: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let logits = self.class.forward(hidden);
        let boxes = self.bbox.forward(hidden).mapv(sigmoid);
        (logits, boxes)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
