// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use pcb_defect_detector::api::HealthResponse;
use pcb_defect_detector::version::VERSION_NUMBER;
use tower::ServiceExt; // for `oneshot`

use crate::support::{app_with, body_json, StubDetector};

#[tokio::test]
async fn test_health_reports_model() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app_with(StubDetector::default())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = body_json(response).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, VERSION_NUMBER);
    assert_eq!(health.model.device, "cpu");
    assert_eq!(health.model.path, "models/test_pcb.onnx");
    assert_eq!(health.model.classes.len(), 6);
    assert_eq!(health.model.classes[2], "open circuit");
    assert_eq!(health.max_concurrent_inferences, 2);
    assert_eq!(health.available_inference_slots, 2);
}

#[tokio::test]
async fn test_health_uses_camel_case() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app_with(StubDetector::default())
        .oneshot(request)
        .await
        .unwrap();
    let body: serde_json::Value = body_json(response).await;

    assert!(body.get("maxConcurrentInferences").is_some());
    assert!(body.get("availableInferenceSlots").is_some());
}
