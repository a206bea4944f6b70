// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encoder-decoder attention stack
//!
//! Post-norm layers with ReLU feed-forward blocks, each stack closed by its
//! own LayerNorm. Inference only: dropout is never applied and all queries
//! are decoded in a single parallel pass.

use ndarray::Array2;

use super::checkpoint::Checkpoint;
use super::layers::{FeedForward, LayerNorm, MultiHeadAttention};
use crate::config::DetrArchitecture;
use crate::vision::errors::DetectorError;

#[derive(Debug, Clone)]
pub struct EncoderLayer {
    self_attn: MultiHeadAttention,
    feed_forward: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
}

impl EncoderLayer {
    fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        arch: &DetrArchitecture,
    ) -> Result<Self, DetectorError> {
        let d = arch.hidden_dim;
        Ok(Self {
            self_attn: MultiHeadAttention::load(
                checkpoint,
                &format!("{prefix}.self_attn"),
                d,
                arch.num_heads,
            )?,
            feed_forward: FeedForward::load(checkpoint, prefix, d, arch.ffn_dim)?,
            norm1: LayerNorm::load(checkpoint, &format!("{prefix}.norm1"), d, arch.layer_norm_eps)?,
            norm2: LayerNorm::load(checkpoint, &format!("{prefix}.norm2"), d, arch.layer_norm_eps)?,
        })
    }

    fn forward(&self, src: &Array2<f32>) -> Array2<f32> {
        let x = self.norm1.forward(&(src + &self.self_attn.forward(src, src)));
        self.norm2.forward(&(&x + &self.feed_forward.forward(&x)))
    }
}

#[derive(Debug, Clone)]
pub struct DecoderLayer {
    self_attn: MultiHeadAttention,
    cross_attn: MultiHeadAttention,
    feed_forward: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
    norm3: LayerNorm,
}

impl DecoderLayer {
    fn load(
        checkpoint: &mut Checkpoint,
        prefix: &str,
        arch: &DetrArchitecture,
    ) -> Result<Self, DetectorError> {
        let d = arch.hidden_dim;
        let eps = arch.layer_norm_eps;
        Ok(Self {
            self_attn: MultiHeadAttention::load(
                checkpoint,
                &format!("{prefix}.self_attn"),
                d,
                arch.num_heads,
            )?,
            cross_attn: MultiHeadAttention::load(
                checkpoint,
                &format!("{prefix}.multihead_attn"),
                d,
                arch.num_heads,
            )?,
            feed_forward: FeedForward::load(checkpoint, prefix, d, arch.ffn_dim)?,
            norm1: LayerNorm::load(checkpoint, &format!("{prefix}.norm1"), d, eps)?,
            norm2: LayerNorm::load(checkpoint, &format!("{prefix}.norm2"), d, eps)?,
            norm3: LayerNorm::load(checkpoint, &format!("{prefix}.norm3"), d, eps)?,
        })
    }

    fn forward(&self, tgt: &Array2<f32>, memory: &Array2<f32>) -> Array2<f32> {
        let x = self.norm1.forward(&(tgt + &self.self_attn.forward(tgt, tgt)));
        let x = self.norm2.forward(&(&x + &self.cross_attn.forward(&x, memory)));
        self.norm3.forward(&(&x + &self.feed_forward.forward(&x)))
    }
}

/// Full stack under the `transformer.` prefix
#[derive(Debug, Clone)]
pub struct AttentionStack {
    encoder_layers: Vec<EncoderLayer>,
    encoder_norm: LayerNorm,
    decoder_layers: Vec<DecoderLayer>,
    decoder_norm: LayerNorm,
}

impl AttentionStack {
    pub fn load(
        checkpoint: &mut Checkpoint,
        arch: &DetrArchitecture,
    ) -> Result<Self, DetectorError> {
        let encoder_layers = (0..arch.num_encoder_layers)
            .map(|i| {
                EncoderLayer::load(checkpoint, &format!("transformer.encoder.layers.{i}"), arch)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let decoder_layers = (0..arch.num_decoder_layers)
            .map(|i| {
                DecoderLayer::load(checkpoint, &format!("transformer.decoder.layers.{i}"), arch)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let eps = arch.layer_norm_eps;
        Ok(Self {
            encoder_layers,
            encoder_norm: LayerNorm::load(checkpoint, "transformer.encoder.norm", arch.hidden_dim, eps)?,
            decoder_layers,
            decoder_norm: LayerNorm::load(checkpoint, "transformer.decoder.norm", arch.hidden_dim, eps)?,
        })
    }

    /// src: [tokens, d], tgt: [queries, d] -> hidden states [queries, d]
    pub fn forward(&self, src: &Array2<f32>, tgt: &Array2<f32>) -> Array2<f32> {
        let mut memory = src.clone();
        for layer in &self.encoder_layers {
            memory = layer.forward(&memory);
        }
        let memory = self.encoder_norm.forward(&memory);

        let mut hidden = tgt.clone();
        for layer in &self.decoder_layers {
            hidden = layer.forward(&hidden, &memory);
        }
        self.decoder_norm.forward(&hidden)
    }
}
