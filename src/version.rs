// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the PCB defect detection service

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Build date
pub const BUILD_DATE: &str = "2025-10-20";

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("PCB Defect Detector {} ({})", VERSION_NUMBER, BUILD_DATE)
}
