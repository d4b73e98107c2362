// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod health;
pub mod http_server;

pub use detect::{
    detect_defects_handler, DetectDefectsResponse, DetectQuery, DetectionResult,
    DEFAULT_CONFIDENCE_THRESHOLD, IMAGE_FIELD,
};
pub use errors::{ApiError, ErrorResponse};
pub use health::{health_handler, HealthResponse, ModelHealth};
pub use http_server::{create_app, start_server, AppState};
