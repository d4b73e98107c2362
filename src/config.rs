// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Configuration is resolved once at startup. Built-in defaults can be
//! overridden by an optional TOML file, which in turn can be overridden by
//! command line flags or environment variables (see [`crate::cli`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::vision::labels::PCB_DEFECT_CLASSES;

/// Default listen address (all interfaces, port 8000)
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default upload limit (20MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Compute device the detector runs on. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

/// Channel order the model expects for its image input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Bgr,
    Rgb,
}

/// Detection model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the exported ONNX detector
    pub model_path: PathBuf,
    pub device: Device,
    /// Number of classes the model was trained with
    pub num_classes: usize,
    /// Label for each class id, in training order
    pub class_names: Vec<String>,
    /// Target length of the shortest image edge after resizing
    pub min_size_test: u32,
    /// Upper bound on the longest image edge after resizing
    pub max_size_test: u32,
    pub pixel_format: PixelFormat,
    /// Scale pixel values to [0, 1] instead of feeding raw 0-255 values
    pub scale_to_unit: bool,
    /// Whether the image input carries a leading batch dimension
    pub batch_input: bool,
    /// ONNX Runtime intra-op thread count
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/pcb_faster_rcnn.onnx"),
            device: Device::Cpu,
            num_classes: PCB_DEFECT_CLASSES.len(),
            class_names: PCB_DEFECT_CLASSES.iter().map(|s| s.to_string()).collect(),
            min_size_test: 800,
            max_size_test: 1333,
            pixel_format: PixelFormat::Bgr,
            scale_to_unit: false,
            batch_input: false,
            intra_threads: 4,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub model: ModelConfig,
    /// Maximum number of inferences running at the same time. One model
    /// session is loaded per slot, so memory grows with this value.
    pub max_concurrent_inferences: usize,
    /// How long a request may wait for an inference slot
    pub queue_timeout_ms: u64,
    /// Upper bound on a single inference, unbounded when unset
    pub inference_timeout_ms: Option<u64>,
    pub max_upload_bytes: usize,
    /// Allowed CORS origins, "*" allows any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            model: ModelConfig::default(),
            max_concurrent_inferences: 2,
            queue_timeout_ms: 30_000,
            inference_timeout_ms: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServiceConfig {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a configuration file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration before anything is loaded
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "listen_addr",
                format!("'{}' is not a socket address", self.listen_addr),
            ));
        }

        if self.max_concurrent_inferences == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_inferences",
                "must be at least 1",
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::invalid("max_upload_bytes", "must be at least 1"));
        }

        if self.cors_allowed_origins.is_empty() {
            return Err(ConfigError::invalid(
                "cors_allowed_origins",
                "at least one origin (or \"*\") is required",
            ));
        }

        let model = &self.model;
        if model.model_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("model.model_path", "must not be empty"));
        }

        if model.num_classes != model.class_names.len() {
            return Err(ConfigError::invalid(
                "model.class_names",
                format!(
                    "{} class names configured but model.num_classes is {}",
                    model.class_names.len(),
                    model.num_classes
                ),
            ));
        }

        if model.min_size_test == 0 || model.max_size_test < model.min_size_test {
            return Err(ConfigError::invalid(
                "model.max_size_test",
                format!(
                    "resize bounds must satisfy 0 < min_size_test ({}) <= max_size_test ({})",
                    model.min_size_test, model.max_size_test
                ),
            ));
        }

        if model.intra_threads == 0 {
            return Err(ConfigError::invalid("model.intra_threads", "must be at least 1"));
        }

        Ok(())
    }
}
