// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime backed PCB defect detector
//!
//! Wraps an exported two-stage detector (Faster R-CNN style) that takes a
//! single image tensor and returns per-instance boxes, class ids and
//! scores as three separate outputs.

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::detector::{DefectDetector, RawInstance};
use super::preprocessing::{image_to_tensor, TensorLayout};
use crate::config::{Device, ModelConfig};

/// Metadata key a model artifact may use to declare its class names
pub const CLASS_NAMES_METADATA_KEY: &str = "class_names";

/// Positions of the three detector outputs in the session's output list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub boxes: usize,
    pub classes: usize,
    pub scores: usize,
}

impl OutputLayout {
    /// Locate outputs by name (`*box*`, `*class*`/`*label*`, `*score*`),
    /// falling back to positional order boxes, classes, scores.
    pub fn resolve(names: &[String]) -> Result<Self> {
        let find = |needles: &[&str]| {
            names.iter().position(|name| {
                let name = name.to_lowercase();
                needles.iter().any(|needle| name.contains(needle))
            })
        };

        if let (Some(boxes), Some(classes), Some(scores)) = (
            find(&["box"]),
            find(&["class", "label"]),
            find(&["score"]),
        ) {
            if boxes != classes && boxes != scores && classes != scores {
                return Ok(Self {
                    boxes,
                    classes,
                    scores,
                });
            }
        }

        if names.len() >= 3 {
            debug!(
                "Detector outputs {:?} not recognized by name, using positional order",
                names
            );
            return Ok(Self {
                boxes: 0,
                classes: 1,
                scores: 2,
            });
        }

        anyhow::bail!(
            "Detection model must expose boxes, classes and scores outputs, found {:?}",
            names
        )
    }
}

/// PCB defect detector running on ONNX Runtime
///
/// Sessions are created once at startup. A session needs exclusive access
/// to run, so the detector keeps one session per inference slot and each
/// call takes whichever one is idle.
pub struct OnnxDefectDetector {
    sessions: Vec<Mutex<Session>>,
    next_session: AtomicUsize,
    input_name: String,
    outputs: OutputLayout,
    layout: TensorLayout,
    model_path: PathBuf,
    declared_class_names: Option<String>,
}

impl std::fmt::Debug for OnnxDefectDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDefectDetector")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("outputs", &self.outputs)
            .field("layout", &self.layout)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

impl OnnxDefectDetector {
    /// Load the detector described by `config`, with `session_count`
    /// independent sessions so that many inferences can run in parallel
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime initialization fails
    /// - Model does not expose the expected outputs
    pub fn load(config: &ModelConfig, session_count: usize) -> Result<Self> {
        let model_path = config.model_path.as_path();

        if !model_path.exists() {
            anyhow::bail!("Detection model not found: {}", model_path.display());
        }

        info!(
            "Loading PCB defect detection model from {} (device: {})",
            model_path.display(),
            config.device.as_str()
        );

        let session = build_session(model_path, config.device, config.intra_threads)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow!("Detection model has no inputs"))?;

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();
        let outputs = OutputLayout::resolve(&output_names)?;

        debug!(
            "Detection model loaded - input: {}, outputs: {:?} -> {:?}",
            input_name, output_names, outputs
        );

        let declared_class_names = session
            .metadata()
            .ok()
            .and_then(|metadata| metadata.custom(CLASS_NAMES_METADATA_KEY).ok().flatten());

        let mut sessions = vec![Mutex::new(session)];
        for _ in 1..session_count.max(1) {
            sessions.push(Mutex::new(build_session(
                model_path,
                config.device,
                config.intra_threads,
            )?));
        }

        info!(
            "✅ PCB defect detection model loaded successfully ({} sessions)",
            sessions.len()
        );

        Ok(Self {
            sessions,
            next_session: AtomicUsize::new(0),
            input_name,
            outputs,
            layout: TensorLayout::from(config),
            model_path: model_path.to_path_buf(),
            declared_class_names,
        })
    }

    /// Class names embedded in the model artifact, if any
    pub fn declared_class_names(&self) -> Option<&str> {
        self.declared_class_names.as_deref()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

fn build_session(model_path: &Path, device: Device, intra_threads: usize) -> Result<Session> {
    let builder = Session::builder().context("Failed to create session builder")?;

    let builder = match device {
        Device::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?,
        Device::Cuda => {
            // ONNX Runtime falls through to the next provider when CUDA cannot be registered
            warn!("CUDA requested; inference falls back to CPU if CUDA is unavailable");
            builder
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set CUDA execution provider")?
        }
    };

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load detection model from {}",
            model_path.display()
        ))
}

impl DefectDetector for OnnxDefectDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawInstance>> {
        let (tensor, plan) = image_to_tensor(image, &self.layout);
        debug!(
            "Detector input {}x{} -> {}x{}",
            plan.orig_width, plan.orig_height, plan.width, plan.height
        );

        let input_value = Value::from_array(tensor).context("Failed to create input tensor")?;

        let mut session = idle_slot(&self.sessions, &self.next_session)?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detection inference failed")?;

        let boxes: Vec<f32> = outputs[self.outputs.boxes]
            .try_extract_array::<f32>()
            .context("Failed to extract boxes tensor")?
            .iter()
            .copied()
            .collect();
        let scores: Vec<f32> = outputs[self.outputs.scores]
            .try_extract_array::<f32>()
            .context("Failed to extract scores tensor")?
            .iter()
            .copied()
            .collect();
        let class_ids = extract_class_ids(&outputs[self.outputs.classes])?;

        let raw = assemble_instances(&boxes, &class_ids, &scores)?;
        Ok(raw
            .into_iter()
            .map(|(bbox, class_id, score)| RawInstance {
                bbox: plan.to_original(bbox),
                class_id,
                score,
            })
            .collect())
    }
}

/// Lock an idle slot, or wait on the next one in turn if all are busy
fn idle_slot<'a, T>(slots: &'a [Mutex<T>], next: &AtomicUsize) -> Result<MutexGuard<'a, T>> {
    if slots.is_empty() {
        anyhow::bail!("No detection sessions loaded");
    }

    if let Some(guard) = slots.iter().find_map(|slot| slot.try_lock().ok()) {
        return Ok(guard);
    }

    let index = next.fetch_add(1, Ordering::Relaxed) % slots.len();
    slots[index]
        .lock()
        .map_err(|_| anyhow!("Detection session lock poisoned"))
}

/// Exported detectors disagree on the class tensor dtype
fn extract_class_ids(value: &DynValue) -> Result<Vec<i64>> {
    if let Ok(ids) = value.try_extract_array::<i64>() {
        return Ok(ids.iter().copied().collect());
    }
    if let Ok(ids) = value.try_extract_array::<i32>() {
        return Ok(ids.iter().map(|&id| id as i64).collect());
    }
    let ids = value
        .try_extract_array::<f32>()
        .context("Failed to extract classes tensor")?;
    Ok(ids.iter().map(|&id| id.round() as i64).collect())
}

/// Zip flattened detector outputs into per-instance tuples, in model order
fn assemble_instances(
    boxes: &[f32],
    class_ids: &[i64],
    scores: &[f32],
) -> Result<Vec<([f32; 4], i64, f32)>> {
    if boxes.len() % 4 != 0 {
        anyhow::bail!("Boxes tensor has {} values, not a multiple of 4", boxes.len());
    }

    let count = boxes.len() / 4;
    if class_ids.len() != count || scores.len() != count {
        anyhow::bail!(
            "Detector output size mismatch: {} boxes, {} classes, {} scores",
            count,
            class_ids.len(),
            scores.len()
        );
    }

    Ok(boxes
        .chunks_exact(4)
        .zip(class_ids.iter().zip(scores.iter()))
        .map(|(b, (&class_id, &score))| ([b[0], b[1], b[2], b[3]], class_id, score))
        .collect())
}
