// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Defect detection API endpoint module
//!
//! Provides POST /detect-defects for finding defects in PCB images.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::detect_defects_handler;
pub use request::{DetectQuery, DEFAULT_CONFIDENCE_THRESHOLD, IMAGE_FIELD};
pub use response::{DetectDefectsResponse, DetectionResult};
