// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detector seam and detection result types

use anyhow::Result;
use image::DynamicImage;

use super::labels::{ClassLabelTable, LabelError};

/// Axis-aligned box in original image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// `[x_min, y_min, x_max, y_max]`
    pub fn to_array(self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

/// One instance as produced by the model, before filtering and labelling
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub bbox: BoundingBox,
    pub class_id: i64,
    pub score: f32,
}

/// A labelled detection that passed the confidence threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub score: f32,
}

/// Anything that can find defect instances in a decoded image.
///
/// Implementations are loaded once and shared across requests, so `detect`
/// takes `&self` and must be callable from several threads.
#[cfg_attr(test, mockall::automock)]
pub trait DefectDetector: Send + Sync {
    /// Run one synchronous inference pass. Instances come back in model order.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawInstance>>;
}

/// Keep instances scoring at least `threshold` and attach their labels.
///
/// Model order is preserved. A class id outside the table is an error
/// rather than a silently mislabelled result.
pub fn select_detections(
    instances: Vec<RawInstance>,
    threshold: f32,
    labels: &ClassLabelTable,
) -> Result<Vec<Detection>, LabelError> {
    instances
        .into_iter()
        .filter(|instance| instance.score >= threshold)
        .map(|instance| {
            Ok(Detection {
                label: labels.label(instance.class_id)?.to_string(),
                bbox: instance.bbox,
                score: instance.score,
            })
        })
        .collect()
}
