// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detection endpoint tests
//!
//! Drive POST /detect-defects through the full router with a stub detector
//! and check thresholding, labelling and ordering of the results.

use axum::http::StatusCode;
use pcb_defect_detector::api::DetectDefectsResponse;
use std::sync::atomic::Ordering;
use tower::ServiceExt; // for `oneshot`

use crate::support::{
    app_with, body_json, detect_request, image_request, instance, jpeg_with_orientation,
    StubDetector,
};

fn open_circuit() -> StubDetector {
    StubDetector::returning(vec![instance([10.0, 20.0, 110.0, 220.0], 2, 0.83)])
}

#[tokio::test]
async fn test_detects_open_circuit_at_default_threshold() {
    let app = app_with(open_circuit());

    let response = app.oneshot(image_request("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: DetectDefectsResponse = body_json(response).await;
    assert_eq!(body.results.len(), 1);
    let result = &body.results[0];
    assert_eq!(result.class_label, "open circuit");
    assert_eq!(result.score, 0.83);
    assert_eq!(result.bbox, [10.0, 20.0, 110.0, 220.0]);
}

#[tokio::test]
async fn test_wire_format_uses_class_key() {
    let app = app_with(open_circuit());

    let response = app
        .oneshot(image_request("?confidence_threshold=0.5"))
        .await
        .unwrap();
    let body: serde_json::Value = body_json(response).await;

    let result = &body["results"][0];
    assert_eq!(result["class"], "open circuit");
    assert_eq!(result["bbox"].as_array().unwrap().len(), 4);
    assert!(result.get("score").is_some());
}

#[tokio::test]
async fn test_high_threshold_filters_everything() {
    let app = app_with(open_circuit());

    let response = app
        .oneshot(image_request("?confidence_threshold=0.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "results": [] }));
}

#[tokio::test]
async fn test_threshold_bounds_are_inclusive() {
    let detector = || {
        StubDetector::returning(vec![
            instance([0.0, 0.0, 5.0, 5.0], 0, 0.0),
            instance([1.0, 1.0, 6.0, 6.0], 5, 1.0),
        ])
    };

    let response = app_with(detector())
        .oneshot(image_request("?confidence_threshold=0"))
        .await
        .unwrap();
    let body: DetectDefectsResponse = body_json(response).await;
    assert_eq!(body.results.len(), 2);

    let response = app_with(detector())
        .oneshot(image_request("?confidence_threshold=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: DetectDefectsResponse = body_json(response).await;
    assert_eq!(body.results.len(), 1);
    assert_eq!(body.results[0].class_label, "spurious copper");
}

#[tokio::test]
async fn test_model_order_is_preserved() {
    let app = app_with(StubDetector::returning(vec![
        instance([0.0, 0.0, 10.0, 10.0], 3, 0.6),
        instance([5.0, 5.0, 15.0, 15.0], 0, 0.95),
        instance([8.0, 8.0, 20.0, 20.0], 4, 0.2),
        instance([2.0, 2.0, 12.0, 12.0], 1, 0.7),
    ]));

    let response = app
        .oneshot(image_request("?confidence_threshold=0.5"))
        .await
        .unwrap();
    let body: DetectDefectsResponse = body_json(response).await;

    let labels: Vec<&str> = body.results.iter().map(|r| r.class_label.as_str()).collect();
    assert_eq!(labels, vec!["short", "missing hole", "mouse bite"]);
    let scores: Vec<f32> = body.results.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![0.6, 0.95, 0.7]);
}

#[tokio::test]
async fn test_raising_threshold_never_adds_results() {
    let instances = vec![
        instance([0.0, 0.0, 10.0, 10.0], 0, 0.15),
        instance([0.0, 0.0, 10.0, 10.0], 1, 0.45),
        instance([0.0, 0.0, 10.0, 10.0], 2, 0.5),
        instance([0.0, 0.0, 10.0, 10.0], 3, 0.77),
        instance([0.0, 0.0, 10.0, 10.0], 4, 0.99),
    ];

    let mut previous = usize::MAX;
    for threshold in ["0", "0.15", "0.3", "0.5", "0.77", "0.9", "1"] {
        let app = app_with(StubDetector::returning(instances.clone()));
        let response = app
            .oneshot(image_request(&format!("?confidence_threshold={}", threshold)))
            .await
            .unwrap();
        let body: DetectDefectsResponse = body_json(response).await;

        assert!(body.results.len() <= previous, "threshold {}", threshold);
        assert!(body.results.iter().all(|r| r.score >= threshold.parse::<f32>().unwrap()));
        previous = body.results.len();
    }
}

#[tokio::test]
async fn test_detector_called_once_per_request() {
    let detector = open_circuit();
    let calls = detector.call_counter();
    let app = app_with(detector);

    let response = app.oneshot(image_request("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_extra_multipart_fields_are_ignored() {
    use crate::support::{png_bytes, BOUNDARY};
    use axum::{body::Body, http::Request};

    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nline 3\r\n",
        b = BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"b.png\"\r\nContent-Type: image/png\r\n\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png_bytes(16, 16));
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/detect-defects")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app_with(open_circuit()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotated_phone_photo_is_detected_upright() {
    let detector = open_circuit();
    let sizes = detector.seen_sizes();
    let app = app_with(detector);

    // Stored 40x20, EXIF says rotate 90 degrees clockwise for display
    let response = app
        .oneshot(detect_request("", "file", &jpeg_with_orientation(40, 20, 6)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(*sizes.lock().unwrap(), vec![(20, 40)]);
}
