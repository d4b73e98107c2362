// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detection model manager tests
//!
//! Verify that the manager:
//! - Labels and filters instances from the detector
//! - Bounds concurrent inferences and fails fast when saturated
//! - Keeps a slot occupied until a timed-out inference really finishes
//! - Refuses to start when the model file is missing

use image::DynamicImage;
use pcb_defect_detector::config::ServiceConfig;
use pcb_defect_detector::vision::{
    DetectionError, DetectionModelManager, InferenceLimits, LabelError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{instance, manager_with, StubDetector};

fn board() -> DynamicImage {
    DynamicImage::new_rgb8(32, 32)
}

#[tokio::test]
async fn test_detect_labels_and_filters() {
    let manager = manager_with(
        StubDetector::returning(vec![
            instance([1.0, 2.0, 3.0, 4.0], 2, 0.83),
            instance([5.0, 6.0, 7.0, 8.0], 3, 0.31),
        ]),
        InferenceLimits::default(),
    );

    let detections = manager.detect(board(), 0.5).await.unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "open circuit");
    assert_eq!(detections[0].bbox.to_array(), [1.0, 2.0, 3.0, 4.0]);
}

#[tokio::test]
async fn test_unknown_class_is_error() {
    let manager = manager_with(
        StubDetector::returning(vec![instance([0.0, 0.0, 1.0, 1.0], -1, 0.9)]),
        InferenceLimits::default(),
    );

    let err = manager.detect(board(), 0.5).await.unwrap_err();
    assert!(matches!(
        err,
        DetectionError::Label(LabelError::UnknownClass { class_id: -1, .. })
    ));
}

#[tokio::test]
async fn test_detector_error_propagates() {
    let manager = manager_with(
        StubDetector::failing("output tensor missing"),
        InferenceLimits::default(),
    );

    let err = manager.detect(board(), 0.5).await.unwrap_err();
    assert!(matches!(err, DetectionError::Inference(_)));
    assert!(err.to_string().contains("output tensor missing"));
}

#[tokio::test]
async fn test_saturated_manager_reports_busy() {
    let manager = Arc::new(manager_with(
        StubDetector::default().with_delay(Duration::from_millis(400)),
        InferenceLimits {
            max_concurrent: 1,
            queue_timeout: Duration::from_millis(50),
            inference_timeout: None,
        },
    ));

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.detect(board(), 0.5).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.available_slots(), 0);

    let err = manager.detect(board(), 0.5).await.unwrap_err();
    assert!(matches!(err, DetectionError::Busy(_)));

    assert!(first.await.unwrap().is_ok());
    assert_eq!(manager.available_slots(), 1);
}

#[tokio::test]
async fn test_timed_out_inference_keeps_slot_until_done() {
    let manager = manager_with(
        StubDetector::default().with_delay(Duration::from_millis(300)),
        InferenceLimits {
            max_concurrent: 1,
            queue_timeout: Duration::from_secs(5),
            inference_timeout: Some(Duration::from_millis(50)),
        },
    );

    let err = manager.detect(board(), 0.5).await.unwrap_err();
    assert!(matches!(err, DetectionError::Timeout(_)));
    assert_eq!(manager.available_slots(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.available_slots(), 1);
}

#[test]
fn test_limits_from_config() {
    let config = ServiceConfig {
        max_concurrent_inferences: 4,
        queue_timeout_ms: 1500,
        inference_timeout_ms: Some(9000),
        ..ServiceConfig::default()
    };

    let limits = InferenceLimits::from(&config);
    assert_eq!(limits.max_concurrent, 4);
    assert_eq!(limits.queue_timeout, Duration::from_millis(1500));
    assert_eq!(limits.inference_timeout, Some(Duration::from_secs(9)));
}

#[test]
fn test_load_fails_without_model_file() {
    let mut config = ServiceConfig::default();
    config.model.model_path = PathBuf::from("/nonexistent/pcb_faster_rcnn.onnx");

    let err = DetectionModelManager::load(&config).err().unwrap();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_load_rejects_mismatched_label_table() {
    let mut config = ServiceConfig::default();
    config.model.class_names.pop();

    let err = DetectionModelManager::load(&config).err().unwrap();
    assert!(err.to_string().contains("Expected 6 class labels, got 5"));
}
