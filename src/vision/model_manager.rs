// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection model manager
//!
//! Owns the detector and the class label table for the lifetime of the
//! process and bounds how many inferences run at once.

use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::detector::{select_detections, DefectDetector, Detection};
use super::labels::{ClassLabelTable, LabelError};
use super::onnx_detector::OnnxDefectDetector;
use crate::config::{Device, ServiceConfig};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("No inference slot became free within {0:?}")]
    Busy(Duration),

    #[error("Inference did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error(transparent)]
    Label(#[from] LabelError),
}

/// Concurrency limits applied to inference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceLimits {
    pub max_concurrent: usize,
    pub queue_timeout: Duration,
    pub inference_timeout: Option<Duration>,
}

impl Default for InferenceLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_timeout: Duration::from_secs(30),
            inference_timeout: None,
        }
    }
}

impl From<&ServiceConfig> for InferenceLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_inferences,
            queue_timeout: config.queue_timeout(),
            inference_timeout: config.inference_timeout(),
        }
    }
}

/// Information about the loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionModelInfo {
    pub model_path: PathBuf,
    pub device: Device,
}

/// Manager for the PCB defect detector
pub struct DetectionModelManager {
    detector: Arc<dyn DefectDetector>,
    labels: ClassLabelTable,
    permits: Arc<Semaphore>,
    limits: InferenceLimits,
    info: DetectionModelInfo,
}

impl DetectionModelManager {
    /// Wrap an already loaded detector
    pub fn new(
        detector: Arc<dyn DefectDetector>,
        labels: ClassLabelTable,
        limits: InferenceLimits,
        info: DetectionModelInfo,
    ) -> Self {
        Self {
            detector,
            labels,
            permits: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            limits,
            info,
        }
    }

    /// Load the ONNX detector and label table from configuration
    ///
    /// Fails if the label table does not match the configured class count
    /// or the class names embedded in the model artifact.
    pub fn load(config: &ServiceConfig) -> anyhow::Result<Self> {
        let labels = ClassLabelTable::new(
            config.model.class_names.clone(),
            config.model.num_classes,
        )?;

        // One session per inference slot
        let detector =
            OnnxDefectDetector::load(&config.model, config.max_concurrent_inferences)?;

        match detector.declared_class_names() {
            Some(declared) => {
                labels.verify_declared(declared)?;
                info!("Class label table matches model metadata ({} classes)", labels.len());
            }
            None => warn!(
                "⚠️ Model does not declare class names; using configured table {:?}",
                labels.names()
            ),
        }

        let info = DetectionModelInfo {
            model_path: detector.model_path().to_path_buf(),
            device: config.model.device,
        };

        Ok(Self::new(
            Arc::new(detector),
            labels,
            InferenceLimits::from(config),
            info,
        ))
    }

    /// Run the detector on one image and keep detections scoring at least `threshold`
    ///
    /// Waits for an inference slot first. The slot is held by the blocking
    /// inference task itself, so it is only released once the model call
    /// returns, even if this future is dropped or times out.
    pub async fn detect(
        &self,
        image: DynamicImage,
        threshold: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        let permit = match tokio::time::timeout(
            self.limits.queue_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(DetectionError::Inference(anyhow::anyhow!(
                    "inference slots closed"
                )))
            }
            Err(_) => return Err(DetectionError::Busy(self.limits.queue_timeout)),
        };

        let detector = self.detector.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            detector.detect(&image)
        });

        let joined = match self.limits.inference_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| DetectionError::Timeout(limit))?,
            None => task.await,
        };

        let instances = joined
            .map_err(|e| DetectionError::Inference(anyhow::anyhow!("inference task failed: {}", e)))?
            .map_err(DetectionError::Inference)?;

        debug!("Model produced {} instances", instances.len());

        Ok(select_detections(instances, threshold, &self.labels)?)
    }

    pub fn labels(&self) -> &ClassLabelTable {
        &self.labels
    }

    pub fn info(&self) -> &DetectionModelInfo {
        &self.info
    }

    pub fn limits(&self) -> &InferenceLimits {
        &self.limits
    }

    /// Inference slots not currently in use
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}
