// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Defect detection endpoint handler

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use std::time::Instant;
use tracing::{debug, info};

use super::request::{read_image_upload, DetectQuery};
use super::response::DetectDefectsResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::{decode_image_bytes, format_to_extension};

/// POST /detect-defects - Find defects in a PCB image
///
/// # Request
/// - multipart field `file`: the image (any format the image codec recognizes)
/// - query `confidence_threshold`: minimum score, 0.0-1.0 inclusive, defaults to 0.5
///
/// # Response
/// - `results`: detections in model order, each with `bbox`, `class` and `score`
///
/// # Errors
/// - 400 Bad Request: threshold out of range, missing `file`, undecodable image
/// - 413 Payload Too Large: upload exceeds the configured limit
/// - 503 Service Unavailable: no inference slot became free in time
/// - 504 Gateway Timeout: inference exceeded the configured limit
/// - 500 Internal Server Error: model invocation failed
pub async fn detect_defects_handler(
    State(state): State<AppState>,
    query: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectDefectsResponse>, ApiError> {
    let started = Instant::now();

    // 1. Validate threshold before touching the body
    let Query(query) = query.map_err(|rejection| ApiError::ValidationError {
        field: "confidence_threshold".to_string(),
        message: rejection.body_text(),
    })?;
    let threshold = query.threshold()?;

    // 2. Read the uploaded file
    let multipart = multipart.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    let bytes = read_image_upload(multipart, state.max_upload_bytes).await?;

    // 3. Decode image
    let (image, image_info) = decode_image_bytes(&bytes)?;
    debug!(
        "Decoded {} image: {}x{}, {} bytes",
        format_to_extension(image_info.format),
        image_info.width,
        image_info.height,
        image_info.size_bytes
    );

    // 4. Run detection and filter by threshold
    let detections = state.detection.detect(image, threshold).await?;

    info!(
        "Detection complete: {} defects at threshold {:.2}, {}ms",
        detections.len(),
        threshold,
        started.elapsed().as_millis()
    );

    Ok(Json(DetectDefectsResponse::new(detections)))
}
