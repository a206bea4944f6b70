// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Dense building blocks for the detection transformer
//!
//! All layers operate on a single sequence laid out as [tokens, features].
//! Weight layouts follow PyTorch (`Linear.weight` is [out, in]).

use ndarray::{s, Array1, Array2, ArrayView1};

use super::checkpoint::Checkpoint;
use crate::vision::errors::DetectorError;

/// Numerically stable softmax over a 1-D view
pub fn softmax(values: ArrayView1<f32>) -> Array1<f32> {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = values.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn softmax_rows(scores: &mut Array2<f32>) {
    for mut row in scores.rows_mut() {
        let normalized = softmax(row.view());
        row.assign(&normalized);
    }
}

#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        Self { weight, bias }
    }

    pub fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        in_dim: usize,
        out_dim: usize,
    ) -> Result<Self, DetectorError> {
        let weight = checkpoint.take_2d(&format!("{prefix}.weight"), out_dim, in_dim)?;
        let bias = checkpoint.take_1d(&format!("{prefix}.bias"), out_dim)?;
        Ok(Self::new(weight, bias))
    }

    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    /// x: [tokens, in] -> [tokens, out]
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }
}

#[derive(Debug, Clone)]
pub struct LayerNorm {
    weight: Array1<f32>,
    bias: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        dim: usize,
        eps: f32,
    ) -> Result<Self, DetectorError> {
        let weight = checkpoint.take_1d(&format!("{prefix}.weight"), dim)?;
        let bias = checkpoint.take_1d(&format!("{prefix}.bias"), dim)?;
        Ok(Self { weight, bias, eps })
    }

    /// Normalizes each row with biased variance
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut out = x.clone();
        let dim = x.ncols() as f32;
        for mut row in out.rows_mut() {
            let mean = row.sum() / dim;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / dim;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            row.mapv_inplace(|v| (v - mean) * inv_std);
            row *= &self.weight;
            row += &self.bias;
        }
        out
    }
}

/// Scaled dot-product attention with packed input projection
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    in_proj_weight: Array2<f32>,
    in_proj_bias: Array1<f32>,
    out_proj: Linear,
    embed_dim: usize,
    num_heads: usize,
}

impl MultiHeadAttention {
    pub fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        embed_dim: usize,
        num_heads: usize,
    ) -> Result<Self, DetectorError> {
        if num_heads == 0 || embed_dim % num_heads != 0 {
            return Err(DetectorError::Architecture(format!(
                "embedding dim {} is not divisible by {} heads",
                embed_dim, num_heads
            )));
        }

        let in_proj_weight =
            checkpoint.take_2d(&format!("{prefix}.in_proj_weight"), 3 * embed_dim, embed_dim)?;
        let in_proj_bias = checkpoint.take_1d(&format!("{prefix}.in_proj_bias"), 3 * embed_dim)?;
        let out_proj = Linear::load(
            checkpoint,
            &format!("{prefix}.out_proj"),
            embed_dim,
            embed_dim,
        )?;

        Ok(Self {
            in_proj_weight,
            in_proj_bias,
            out_proj,
            embed_dim,
            num_heads,
        })
    }

    fn project(&self, x: &Array2<f32>, chunk: usize) -> Array2<f32> {
        let range = chunk * self.embed_dim..(chunk + 1) * self.embed_dim;
        let weight = self.in_proj_weight.slice(s![range.clone(), ..]);
        let bias = self.in_proj_bias.slice(s![range]);
        x.dot(&weight.t()) + &bias
    }

    /// query: [Lq, E], context: [Lk, E] -> [Lq, E]
    pub fn forward(&self, query: &Array2<f32>, context: &Array2<f32>) -> Array2<f32> {
        let q = self.project(query, 0);
        let k = self.project(context, 1);
        let v = self.project(context, 2);

        let head_dim = self.embed_dim / self.num_heads;
        let scale = 1.0 / (head_dim as f32).sqrt();
        let mut attended = Array2::zeros((query.nrows(), self.embed_dim));

        for head in 0..self.num_heads {
            let cols = head * head_dim..(head + 1) * head_dim;
            let qh = q.slice(s![.., cols.clone()]);
            let kh = k.slice(s![.., cols.clone()]);
            let vh = v.slice(s![.., cols.clone()]);

            let mut scores = qh.dot(&kh.t()) * scale;
            softmax_rows(&mut scores);
            attended.slice_mut(s![.., cols]).assign(&scores.dot(&vh));
        }

        self.out_proj.forward(&attended)
    }
}

/// Two-layer ReLU MLP
#[derive(Debug, Clone)]
pub struct FeedForward {
    linear1: Linear,
    linear2: Linear,
}

impl FeedForward {
    pub fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        dim: usize,
        hidden: usize,
    ) -> Result<Self, DetectorError> {
        Ok(Self {
            linear1: Linear::load(checkpoint, &format!("{prefix}.linear1"), dim, hidden)?,
            linear2: Linear::load(checkpoint, &format!("{prefix}.linear2"), hidden, dim)?,
        })
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let hidden = self.linear1.forward(x).mapv(|v| v.max(0.0));
        self.linear2.forward(&hidden)
    }
}
