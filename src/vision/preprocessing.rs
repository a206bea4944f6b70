// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed image transform applied before the backbone

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// Mean values for normalization (ImageNet)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Std values for normalization (ImageNet)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize to a square input, normalize, lay out as NCHW
///
/// Steps:
/// 1. Resize (bilinear, no aspect preservation) to `size` x `size`
/// 2. Normalize: (pixel / 255.0 - mean) / std
/// 3. Convert to tensor [1, 3, size, size]
#[derive(Debug, Clone)]
pub struct Preprocessor {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            mean: MEAN,
            std: STD,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let resized = if image.dimensions() == (self.size, self.size) {
            image.clone()
        } else {
            image::imageops::resize(image, self.size, self.size, FilterType::Triangle)
        };

        let size = self.size as usize;
        let mut tensor = Array4::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let normalized = (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
                tensor[[0, c, y as usize, x as usize]] = normalized;
            }
        }

        tensor
    }
}
