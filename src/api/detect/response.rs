// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection response types

use serde::{Deserialize, Serialize};

use crate::vision::Detection;

/// One detected defect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// `[x_min, y_min, x_max, y_max]` in original image pixels
    pub bbox: [f32; 4],
    /// Defect class label
    #[serde(rename = "class")]
    pub class_label: String,
    /// Confidence score (0.0-1.0)
    pub score: f32,
}

impl From<Detection> for DetectionResult {
    fn from(detection: Detection) -> Self {
        Self {
            bbox: detection.bbox.to_array(),
            class_label: detection.label,
            score: detection.score,
        }
    }
}

/// Response from POST /detect-defects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectDefectsResponse {
    /// Detections in the order the model produced them
    pub results: Vec<DetectionResult>,
}

impl DetectDefectsResponse {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            results: detections.into_iter().map(DetectionResult::from).collect(),
        }
    }
}
