// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end detector behaviour with a synthetic checkpoint
//!
//! The trunk is replaced by `PooledBackbone` so these tests need no ONNX
//! model. The last test runs the real exported trunk and is ignored by
//! default.

use crate::common::{
    config_for, detector, encode_png, solid_image, split_image, write_checkpoint, PooledBackbone,
    Weights,
};
use sign_detr::config::{DetectorConfig, LabelSource};
use sign_detr::vision::{DetectorError, ImageInput, PixelBuffer, SignDetector};
use std::io::Write;

#[test]
fn test_missing_checkpoint_fails_construction() {
    let config = DetectorConfig::new("/nonexistent/checkpoints/104_model.safetensors");
    let result = SignDetector::with_backbone(&config, Box::new(PooledBackbone));
    match result {
        Err(DetectorError::CheckpointNotFound(path)) => {
            assert!(path.ends_with("104_model.safetensors"))
        }
        other => panic!("expected CheckpointNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_default_labels() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(dir.path(), Weights::Zero);
    assert_eq!(detector.labels(), &["hello", "iloveyou", "thankyou"]);
    assert_eq!(detector.confidence_threshold(), 0.8);
}

#[test]
fn test_blank_image_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(dir.path(), Weights::Zero);

    let blank = solid_image(640, 480, [0, 0, 0]);
    let detections = detector.predict(&blank).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn test_label_mapping_and_pixel_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(dir.path(), Weights::Favour(2));

    let detections = detector.predict(&split_image(640, 480)).unwrap();
    assert_eq!(detections.len(), detector.num_queries());
    for d in &detections {
        assert_eq!(d.label, "thankyou");
        assert!(d.confidence > 0.8);
        // centered half-size box in original coordinates, not 224x224
        assert_eq!(d.bbox, [160.0, 120.0, 480.0, 360.0]);
    }
}

#[test]
fn test_predict_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(dir.path(), 3, Weights::Seeded(42));
    let config = config_for(checkpoint).with_confidence_threshold(0.0);
    let detector = SignDetector::with_backbone(&config, Box::new(PooledBackbone)).unwrap();

    let image = split_image(320, 240);
    let first = detector.predict(&image).unwrap();
    let second = detector.predict(&image).unwrap();

    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
}

#[test]
fn test_path_and_buffer_inputs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(dir.path(), 3, Weights::Seeded(9));
    let config = config_for(checkpoint).with_confidence_threshold(0.0);
    let detector = SignDetector::with_backbone(&config, Box::new(PooledBackbone)).unwrap();

    let image = split_image(96, 64);
    let image_path = dir.path().join("frame.png");
    std::fs::File::create(&image_path)
        .unwrap()
        .write_all(&encode_png(&image))
        .unwrap();

    let rgb = image.to_rgb8();
    let bgr: Vec<u8> = rgb
        .as_raw()
        .chunks_exact(3)
        .flat_map(|p| [p[2], p[1], p[0]])
        .collect();

    let from_path = detector.predict(image_path.as_path()).unwrap();
    let from_rgb = detector.predict(PixelBuffer::rgb(rgb.as_raw(), 96, 64)).unwrap();
    let from_bgr = detector.predict(PixelBuffer::bgr(&bgr, 96, 64)).unwrap();
    let from_bytes = detector.predict_bytes(&encode_png(&image)).unwrap();

    assert_eq!(from_path, from_rgb);
    assert_eq!(from_rgb, from_bgr);
    assert_eq!(from_bgr, from_bytes);
}

#[test]
fn test_unreadable_path_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(dir.path(), Weights::Zero);

    let bogus = dir.path().join("not_an_image.jpg");
    std::fs::write(&bogus, b"plain text").unwrap();

    let err = detector.predict(ImageInput::Path(&bogus)).unwrap_err();
    assert!(matches!(err, DetectorError::UnreadableImage { .. }));
}

#[test]
fn test_wrong_buffer_length_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(dir.path(), Weights::Zero);

    let err = detector
        .predict(PixelBuffer::rgb(&[0u8; 10], 4, 4))
        .unwrap_err();
    assert!(matches!(err, DetectorError::UnsupportedInput(_)));
}

#[test]
fn test_label_file_sizes_the_head() {
    let dir = tempfile::tempdir().unwrap();
    let labels_path = dir.path().join("config.json");
    std::fs::write(&labels_path, r#"{"classes": ["yes", "no"]}"#).unwrap();

    let checkpoint = write_checkpoint(dir.path(), 2, Weights::Favour(1));
    let config = config_for(checkpoint).with_labels(LabelSource::File(labels_path));
    let detector = SignDetector::with_backbone(&config, Box::new(PooledBackbone)).unwrap();

    let detections = detector.predict(&solid_image(50, 50, [200, 200, 200])).unwrap();
    assert!(!detections.is_empty());
    assert!(detections.iter().all(|d| d.label == "no"));
}

#[test]
fn test_class_count_mismatch_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(dir.path(), 4, Weights::Zero);
    let result = SignDetector::with_backbone(&config_for(checkpoint), Box::new(PooledBackbone));
    assert!(matches!(result, Err(DetectorError::ParameterShape { .. })));
}

#[test]
#[ignore] // Requires checkpoints/104_model.safetensors and checkpoints/resnet50_backbone.onnx
fn test_real_model_blank_frame() {
    let detector = SignDetector::new(&DetectorConfig::default()).unwrap();
    let detections = detector.predict(&solid_image(640, 480, [0, 0, 0])).unwrap();
    for d in &detections {
        assert!(d.confidence > 0.8);
        assert!(d.bbox[0] <= d.bbox[2] && d.bbox[1] <= d.bbox[3]);
    }
}
