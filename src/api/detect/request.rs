// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection request parsing and validation

use axum::body::Bytes;
use axum::http::StatusCode;
use axum_extra::extract::multipart::{Multipart, MultipartError};
use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;

/// Multipart field carrying the uploaded image
pub const IMAGE_FIELD: &str = "file";

/// Threshold applied when the caller does not supply one
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Query parameters for POST /detect-defects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectQuery {
    /// Minimum score a detection needs to be returned (0.0-1.0)
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
}

impl DetectQuery {
    /// The validated threshold, defaulting to 0.5. Both bounds are inclusive.
    pub fn threshold(&self) -> Result<f32, ApiError> {
        let threshold = self
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        if !(0.0..=1.0).contains(&threshold) {
            return Err(ApiError::ValidationError {
                field: "confidence_threshold".to_string(),
                message: format!(
                    "confidence_threshold must be between 0.0 and 1.0, got {}",
                    threshold
                ),
            });
        }

        Ok(threshold)
    }
}

/// Read the bytes of the `file` field from a multipart upload.
///
/// Other fields are skipped. The bytes themselves are not inspected here.
pub async fn read_image_upload(mut multipart: Multipart, limit: usize) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            return field.bytes().await.map_err(|e| multipart_error(e, limit));
        }
    }

    Err(ApiError::InvalidRequest(format!(
        "multipart field '{}' is required",
        IMAGE_FIELD
    )))
}

fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::InvalidRequest(format!("malformed multipart body: {}", e.body_text()))
    }
}
