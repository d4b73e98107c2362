// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for PCB defect detection
//!
//! This module provides:
//! - Image decoding for uploaded board images
//! - The class label table for the six defect classes
//! - The ONNX detector and the manager that shares it across requests

pub mod detector;
pub mod image_utils;
pub mod labels;
pub mod model_manager;
pub mod onnx_detector;
pub mod preprocessing;

pub use detector::{select_detections, BoundingBox, DefectDetector, Detection, RawInstance};
pub use image_utils::{decode_image_bytes, format_to_extension, ImageError, ImageInfo};
pub use labels::{ClassLabelTable, LabelError, PCB_DEFECT_CLASSES};
pub use model_manager::{DetectionError, DetectionModelInfo, DetectionModelManager, InferenceLimits};
pub use onnx_detector::OnnxDefectDetector;
