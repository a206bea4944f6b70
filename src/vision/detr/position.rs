// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed 2-D sine/cosine positional encoding

use ndarray::{Array2, Array3};

use crate::vision::errors::DetectorError;

/// Base period of the geometric frequency progression
pub const TEMPERATURE: f32 = 10000.0;

/// 1-D embedding of shape [length, dim]
///
/// Even channels hold `sin(p * f_k)`, odd channels `cos(p * f_k)`, with
/// `f_k = exp(-2k * ln(TEMPERATURE) / dim)`. When `dim` is odd the last
/// frequency only gets its sine channel.
fn sincos_1d(length: usize, dim: usize) -> Array2<f32> {
    let mut pe = Array2::zeros((length, dim));
    let scale = -TEMPERATURE.ln() / dim as f32;

    for k in (0..dim).step_by(2) {
        let freq = (k as f32 * scale).exp();
        for p in 0..length {
            let angle = p as f32 * freq;
            pe[[p, k]] = angle.sin();
            if k + 1 < dim {
                pe[[p, k + 1]] = angle.cos();
            }
        }
    }

    pe
}

/// Build the position embedding for an `height` x `width` feature grid
///
/// Returns [1, height * width, dim]. The first half of the channels encodes
/// the row, the second half the column. Tokens are ordered row-major so the
/// layout matches a flattened NCHW feature map.
pub fn build_2d_sincos_position_embedding(
    height: usize,
    width: usize,
    dim: usize,
) -> Result<Array3<f32>, DetectorError> {
    if dim % 2 != 0 {
        return Err(DetectorError::OddEmbeddingDim(dim));
    }

    let half = dim / 2;
    let pe_y = sincos_1d(height, half);
    let pe_x = sincos_1d(width, half);

    let mut pos = Array3::zeros((1, height * width, dim));
    for y in 0..height {
        for x in 0..width {
            let token = y * width + x;
            for c in 0..half {
                pos[[0, token, c]] = pe_y[[y, c]];
                pos[[0, token, half + c]] = pe_x[[x, c]];
            }
        }
    }

    Ok(pos)
}
