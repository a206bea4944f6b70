// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Turns raw query predictions into labelled detections

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::detr::layers::softmax;
use super::errors::DetectorError;

/// One detected sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in pixels of the original image
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

/// (cx, cy, w, h) -> (x1, y1, x2, y2)
pub fn box_cxcywh_to_xyxy(b: [f32; 4]) -> [f32; 4] {
    let [cx, cy, w, h] = b;
    [cx - 0.5 * w, cy - 0.5 * h, cx + 0.5 * w, cy + 0.5 * h]
}

/// Normalized center box -> pixel corner box. No clamping to image bounds.
pub fn rescale_box(b: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let [x1, y1, x2, y2] = box_cxcywh_to_xyxy(b);
    let (w, h) = (width as f32, height as f32);
    [x1 * w, y1 * h, x2 * w, y2 * h]
}

/// Index and value of the maximum, first index on ties
fn argmax(values: ArrayView1<f32>) -> (usize, f32) {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best), (i, &v)| {
            if v > best {
                (i, v)
            } else {
                (best_idx, best)
            }
        })
}

/// Filter queries by confidence and map them to labels and pixel boxes
///
/// `logits` is [queries, C + 1] with the no-object slot last; it takes part
/// in the softmax and is then discarded. A query is kept only when its best
/// real-class probability is strictly above `threshold`.
pub fn postprocess(
    logits: &Array2<f32>,
    boxes: &Array2<f32>,
    image_size: (u32, u32),
    threshold: f32,
    labels: &[String],
) -> Result<Vec<Detection>, DetectorError> {
    let num_classes = logits.ncols().saturating_sub(1);
    if num_classes != labels.len() {
        return Err(DetectorError::LabelCountMismatch {
            labels: labels.len(),
            classes: num_classes,
        });
    }
    if boxes.ncols() != 4 || boxes.nrows() != logits.nrows() {
        return Err(DetectorError::Architecture(format!(
            "expected {} boxes of 4 coordinates, got {:?}",
            logits.nrows(),
            boxes.dim()
        )));
    }

    let (width, height) = image_size;
    let mut detections = Vec::new();

    for (query_logits, query_box) in logits.axis_iter(Axis(0)).zip(boxes.axis_iter(Axis(0))) {
        let probs = softmax(query_logits);
        let (class_idx, confidence) = argmax(probs.slice(ndarray::s![..num_classes]));
        if confidence <= threshold {
            continue;
        }

        let b = [query_box[0], query_box[1], query_box[2], query_box[3]];
        detections.push(Detection {
            label: labels[class_idx].clone(),
            confidence,
            bbox: rescale_box(b, width, height),
        });
    }

    Ok(detections)
}
