// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sign detector: image in, labelled boxes out
//!
//! A [`SignDetector`] is immutable once constructed. Construction either
//! completes fully (labels resolved, every checkpoint parameter loaded, trunk
//! session created) or fails; there is no partially usable instance.

use std::path::Path;
use tracing::{debug, info};

use super::detr::backbone::{FeatureExtractor, OnnxBackbone};
use super::detr::checkpoint::Checkpoint;
use super::detr::{DetrHead, DetrModel};
use super::errors::DetectorError;
use super::input::ImageInput;
use super::postprocess::{postprocess, Detection};
use super::preprocessing::Preprocessor;
use crate::config::DetectorConfig;

pub struct SignDetector {
    model: DetrModel,
    labels: Vec<String>,
    confidence_threshold: f32,
    preprocessor: Preprocessor,
}

impl std::fmt::Debug for SignDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignDetector")
            .field("labels", &self.labels)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("input_size", &self.preprocessor.size())
            .finish()
    }
}

impl SignDetector {
    /// Build from a checkpoint and the ONNX trunk named in `config`
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let (labels, head) = Self::load_head(config)?;

        if !config.backbone_path.exists() {
            return Err(DetectorError::BackboneNotFound(config.backbone_path.clone()));
        }
        let backbone = OnnxBackbone::new(
            &config.backbone_path,
            config.target,
            config.architecture.backbone_channels,
        )?;

        Self::assemble(config, labels, head, Box::new(backbone))
    }

    /// Build with a caller-supplied trunk
    pub fn with_backbone(
        config: &DetectorConfig,
        backbone: Box<dyn FeatureExtractor>,
    ) -> Result<Self, DetectorError> {
        let (labels, head) = Self::load_head(config)?;
        Self::assemble(config, labels, head, backbone)
    }

    fn load_head(config: &DetectorConfig) -> Result<(Vec<String>, DetrHead), DetectorError> {
        config.validate()?;
        let labels = config.labels.resolve()?;
        let checkpoint = Checkpoint::load(&config.checkpoint_path)?;
        let head = DetrHead::from_checkpoint(checkpoint, &config.architecture, labels.len())?;
        Ok((labels, head))
    }

    fn assemble(
        config: &DetectorConfig,
        labels: Vec<String>,
        head: DetrHead,
        backbone: Box<dyn FeatureExtractor>,
    ) -> Result<Self, DetectorError> {
        let model = DetrModel::new(backbone, head)?;

        info!(
            "✅ Sign detector ready: classes {:?}, threshold {}",
            labels, config.confidence_threshold
        );

        Ok(Self {
            model,
            labels,
            confidence_threshold: config.confidence_threshold,
            preprocessor: Preprocessor::new(config.input_size),
        })
    }

    /// Detect signs in one image
    ///
    /// Boxes are in pixel coordinates of the image as given, not of the
    /// resized network input. An image with nothing above the threshold
    /// yields an empty list.
    pub fn predict<'a>(
        &self,
        input: impl Into<ImageInput<'a>>,
    ) -> Result<Vec<Detection>, DetectorError> {
        let rgb = input.into().to_rgb()?;
        let (width, height) = rgb.dimensions();

        let tensor = self.preprocessor.preprocess(&rgb);
        let output = self.model.forward(&tensor)?;
        let detections = postprocess(
            &output.logits,
            &output.boxes,
            (width, height),
            self.confidence_threshold,
            &self.labels,
        )?;

        debug!(
            "{}x{} image: {} detections above {}",
            width,
            height,
            detections.len(),
            self.confidence_threshold
        );
        Ok(detections)
    }

    /// Convenience wrapper for a file on disk
    pub fn predict_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Detection>, DetectorError> {
        self.predict(path.as_ref())
    }

    /// Decode an encoded image (PNG, JPEG, ...) and detect
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Vec<Detection>, DetectorError> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            DetectorError::UnsupportedInput(format!("failed to decode image: {}", e))
        })?;
        debug!("Decoded {}x{} image from memory", image.width(), image.height());
        self.predict(&image)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn num_queries(&self) -> usize {
        self.model.head().num_queries()
    }
}
