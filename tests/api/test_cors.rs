// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use axum::{
    body::Body,
    http::{header, Request},
};
use pcb_defect_detector::config::ServiceConfig;
use tower::ServiceExt; // for `oneshot`

use crate::support::{app_with, app_with_config, StubDetector};

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/detect-defects")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_wildcard_allows_any_origin() {
    let response = app_with(StubDetector::default())
        .oneshot(preflight("https://inspector.example.com"))
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_origin_list() {
    let config = ServiceConfig {
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        ..ServiceConfig::default()
    };

    let response = app_with_config(StubDetector::default(), &config)
        .oneshot(preflight("http://localhost:3000"))
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );

    let response = app_with_config(StubDetector::default(), &config)
        .oneshot(preflight("https://elsewhere.example.com"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
