// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, Device, PixelFormat, ServiceConfig};

/// PCB defect detection service
#[derive(Parser, Debug, Default)]
#[command(name = "pcb-defect-detector")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "HTTP service that detects defects in PCB images", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PCB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g. 0.0.0.0:8000)
    #[arg(long, env = "PCB_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Path to the exported ONNX detection model
    #[arg(long, env = "PCB_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Compute device for inference
    #[arg(long, env = "PCB_DEVICE", value_enum)]
    pub device: Option<Device>,

    /// Number of classes the model was trained with
    #[arg(long, env = "PCB_NUM_CLASSES")]
    pub num_classes: Option<usize>,

    /// Comma-separated class labels in training order
    #[arg(long, env = "PCB_CLASS_NAMES", value_delimiter = ',')]
    pub class_names: Option<Vec<String>>,

    /// Channel order expected by the model input
    #[arg(long, env = "PCB_PIXEL_FORMAT", value_enum)]
    pub pixel_format: Option<PixelFormat>,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "PCB_INTRA_THREADS")]
    pub intra_threads: Option<usize>,

    /// Maximum concurrent inferences
    #[arg(long, env = "PCB_MAX_CONCURRENT_INFERENCES")]
    pub max_concurrent_inferences: Option<usize>,

    /// Milliseconds a request may wait for an inference slot
    #[arg(long, env = "PCB_QUEUE_TIMEOUT_MS")]
    pub queue_timeout_ms: Option<u64>,

    /// Milliseconds a single inference may run before the request fails
    #[arg(long, env = "PCB_INFERENCE_TIMEOUT_MS")]
    pub inference_timeout_ms: Option<u64>,

    /// Maximum upload size in bytes
    #[arg(long, env = "PCB_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Comma-separated allowed CORS origins ("*" for any)
    #[arg(long, env = "PCB_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Cli {
    /// Resolve the final configuration: defaults, then the config file, then flags/env.
    pub fn into_config(self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(model_path) = self.model_path {
            config.model.model_path = model_path;
        }
        if let Some(device) = self.device {
            config.model.device = device;
        }
        if let Some(num_classes) = self.num_classes {
            config.model.num_classes = num_classes;
        }
        if let Some(class_names) = self.class_names {
            config.model.class_names = class_names
                .into_iter()
                .map(|name| name.trim().to_string())
                .collect();
        }
        if let Some(pixel_format) = self.pixel_format {
            config.model.pixel_format = pixel_format;
        }
        if let Some(intra_threads) = self.intra_threads {
            config.model.intra_threads = intra_threads;
        }
        if let Some(max) = self.max_concurrent_inferences {
            config.max_concurrent_inferences = max;
        }
        if let Some(ms) = self.queue_timeout_ms {
            config.queue_timeout_ms = ms;
        }
        if let Some(ms) = self.inference_timeout_ms {
            config.inference_timeout_ms = Some(ms);
        }
        if let Some(bytes) = self.max_upload_bytes {
            config.max_upload_bytes = bytes;
        }
        if let Some(origins) = self.cors_allowed_origins {
            config.cors_allowed_origins = origins;
        }

        config.validate()?;
        Ok(config)
    }
}
