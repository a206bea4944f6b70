// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared fixtures: a tiny detection head and a deterministic stand-in trunk
#![allow(dead_code)]

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array4, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sign_detr::config::{DetectorConfig, DetrArchitecture};
use sign_detr::vision::detr::{parameter_shapes, save_checkpoint};
use sign_detr::vision::{FeatureExtractor, SignDetector};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const FEATURE_CHANNELS: usize = 4;
pub const GRID: usize = 7;

pub fn tiny_arch() -> DetrArchitecture {
    DetrArchitecture {
        hidden_dim: 8,
        num_heads: 2,
        num_queries: 5,
        num_encoder_layers: 1,
        num_decoder_layers: 1,
        ffn_dim: 16,
        backbone_channels: FEATURE_CHANNELS,
        layer_norm_eps: 1e-5,
    }
}

/// Average-pools each RGB channel onto a 7x7 grid; the fourth channel is
/// the mean intensity
pub struct PooledBackbone;

impl FeatureExtractor for PooledBackbone {
    fn extract(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (_, _, height, width) = input.dim();
        let (cell_h, cell_w) = (height / GRID, width / GRID);
        let mut features = Array4::zeros((1, FEATURE_CHANNELS, GRID, GRID));

        for gy in 0..GRID {
            for gx in 0..GRID {
                let mut total = 0.0;
                for c in 0..3 {
                    let mut sum = 0.0;
                    for y in gy * cell_h..(gy + 1) * cell_h {
                        for x in gx * cell_w..(gx + 1) * cell_w {
                            sum += input[[0, c, y, x]];
                        }
                    }
                    let mean = sum / (cell_h * cell_w) as f32;
                    features[[0, c, gy, gx]] = mean;
                    total += mean;
                }
                features[[0, 3, gy, gx]] = total / 3.0;
            }
        }

        Ok(features)
    }

    fn out_channels(&self) -> usize {
        FEATURE_CHANNELS
    }
}

/// How checkpoint parameters are filled
#[derive(Debug, Clone, Copy)]
pub enum Weights {
    /// Every parameter zero: all queries are uniform, nothing is detected
    Zero,
    /// Zero except a large bias on one class logit
    Favour(usize),
    /// Small uniform noise, unit LayerNorm gains
    Seeded(u64),
}

pub fn write_checkpoint(dir: &Path, num_classes: usize, weights: Weights) -> PathBuf {
    let mut rng = match weights {
        Weights::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
        _ => None,
    };

    let mut tensors = BTreeMap::new();
    for (name, shape) in parameter_shapes(&tiny_arch(), num_classes) {
        let len: usize = shape.iter().product();
        let norm_gain = name.contains("norm") && name.ends_with(".weight");
        let values: Vec<f32> = match (rng.as_mut(), weights) {
            (Some(_), _) if norm_gain => vec![1.0; len],
            (Some(rng), _) => (0..len).map(|_| rng.gen_range(-0.5_f32..0.5)).collect(),
            (None, Weights::Favour(idx)) if name == "linear_class.bias" => {
                let mut bias = vec![0.0; len];
                bias[idx] = 10.0;
                bias
            }
            _ => vec![0.0; len],
        };
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap();
        tensors.insert(name, array);
    }

    let path = dir.join("head.safetensors");
    save_checkpoint(&path, &tensors).unwrap();
    path
}

pub fn config_for(checkpoint: PathBuf) -> DetectorConfig {
    DetectorConfig::new(checkpoint).with_architecture(tiny_arch())
}

pub fn detector(dir: &Path, weights: Weights) -> SignDetector {
    let checkpoint = write_checkpoint(dir, 3, weights);
    SignDetector::with_backbone(&config_for(checkpoint), Box::new(PooledBackbone)).unwrap()
}

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Left half red, right half blue
pub fn split_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([220, 30, 30])
        } else {
            Rgb([30, 30, 220])
        }
    }))
}

/// Seeded per-pixel noise, which PNG cannot compress much
pub fn noise_image(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| Rgb(rng.gen())))
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
