// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Accepted image inputs for prediction

use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};

use super::errors::DetectorError;

/// Channel order of an interleaved 3-channel buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Blue-green-red, as produced by OpenCV-style capture code
    #[default]
    Bgr,
    Rgb,
}

/// Raw interleaved 8-bit pixels in HWC layout
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl<'a> PixelBuffer<'a> {
    pub fn bgr(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            order: ChannelOrder::Bgr,
        }
    }

    pub fn rgb(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            order: ChannelOrder::Rgb,
        }
    }

    fn to_rgb_image(self) -> Result<RgbImage, DetectorError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::UnsupportedInput(format!(
                "pixel buffer has empty dimensions {}x{}",
                self.width, self.height
            )));
        }

        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(DetectorError::UnsupportedInput(format!(
                "pixel buffer of {} bytes does not match {}x{}x3 ({} bytes)",
                self.data.len(),
                self.width,
                self.height,
                expected
            )));
        }

        let pixels = match self.order {
            ChannelOrder::Rgb => self.data.to_vec(),
            ChannelOrder::Bgr => self
                .data
                .chunks_exact(3)
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect(),
        };

        RgbImage::from_raw(self.width, self.height, pixels).ok_or_else(|| {
            DetectorError::UnsupportedInput("pixel buffer could not be wrapped".to_string())
        })
    }
}

/// The forms of image `SignDetector::predict` accepts
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    /// Encoded image file on disk
    Path(&'a Path),
    /// Decoded pixels with a declared channel order
    Pixels(PixelBuffer<'a>),
    /// Image already decoded by the `image` crate
    Image(&'a DynamicImage),
}

impl<'a> ImageInput<'a> {
    /// Load and convert to RGB
    pub fn to_rgb(self) -> Result<RgbImage, DetectorError> {
        match self {
            ImageInput::Path(path) => {
                let unreadable = |message: String| DetectorError::UnreadableImage {
                    path: path.to_path_buf(),
                    message,
                };
                // Format comes from the file content, not its extension
                let bytes = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
                let image =
                    image::load_from_memory(&bytes).map_err(|e| unreadable(e.to_string()))?;
                Ok(image.to_rgb8())
            }
            ImageInput::Pixels(buffer) => buffer.to_rgb_image(),
            ImageInput::Image(image) => {
                if image.width() == 0 || image.height() == 0 {
                    return Err(DetectorError::UnsupportedInput(
                        "image has empty dimensions".to_string(),
                    ));
                }
                Ok(image.to_rgb8())
            }
        }
    }
}

impl<'a> From<&'a Path> for ImageInput<'a> {
    fn from(path: &'a Path) -> Self {
        ImageInput::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for ImageInput<'a> {
    fn from(path: &'a PathBuf) -> Self {
        ImageInput::Path(path.as_path())
    }
}

impl<'a> From<&'a DynamicImage> for ImageInput<'a> {
    fn from(image: &'a DynamicImage) -> Self {
        ImageInput::Image(image)
    }
}

impl<'a> From<PixelBuffer<'a>> for ImageInput<'a> {
    fn from(buffer: PixelBuffer<'a>) -> Self {
        ImageInput::Pixels(buffer)
    }
}
