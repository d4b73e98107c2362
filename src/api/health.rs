// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Health endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::http_server::AppState;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealth {
    pub path: String,
    pub device: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: ModelHealth,
    pub max_concurrent_inferences: usize,
    pub available_inference_slots: usize,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let manager = &state.detection;
    let info = manager.info();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: version::VERSION_NUMBER.to_string(),
        model: ModelHealth {
            path: info.model_path.display().to_string(),
            device: info.device.as_str().to_string(),
            classes: manager.labels().names().to_vec(),
        },
        max_concurrent_inferences: manager.limits().max_concurrent,
        available_inference_slots: manager.available_slots(),
    })
}
