// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Class label table for the PCB defect detector
//!
//! The model returns integer class ids; this table maps them to names.
//! The order must match the order the model was trained with. Nothing at
//! runtime can detect a reordering, so the table is checked against the
//! configured class count and, when the model artifact declares its own
//! class names, against those as well.

use std::sync::Arc;
use thiserror::Error;

/// Defect classes in training order
pub const PCB_DEFECT_CLASSES: [&str; 6] = [
    "missing hole",
    "mouse bite",
    "open circuit",
    "short",
    "spur",
    "spurious copper",
];

#[derive(Debug, Error, PartialEq)]
pub enum LabelError {
    #[error("Expected {expected} class labels, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Class label at index {0} is empty")]
    EmptyLabel(usize),

    #[error("Model declares class {index} as '{declared}' but configuration has '{configured}'")]
    DeclaredMismatch {
        index: usize,
        declared: String,
        configured: String,
    },

    #[error("Model returned class id {class_id} but only {class_count} classes are known")]
    UnknownClass { class_id: i64, class_count: usize },
}

/// Ordered, immutable class label table
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabelTable {
    labels: Arc<[String]>,
}

impl ClassLabelTable {
    /// Build a table, asserting it has exactly `expected_count` non-empty labels
    pub fn new(labels: Vec<String>, expected_count: usize) -> Result<Self, LabelError> {
        if labels.len() != expected_count {
            return Err(LabelError::CountMismatch {
                expected: expected_count,
                actual: labels.len(),
            });
        }
        if let Some(index) = labels.iter().position(|l| l.trim().is_empty()) {
            return Err(LabelError::EmptyLabel(index));
        }

        Ok(Self {
            labels: labels.into(),
        })
    }

    /// The six PCB defect classes
    pub fn pcb_defaults() -> Self {
        Self {
            labels: PCB_DEFECT_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    /// Look up the label for a class id returned by the model
    pub fn label(&self, class_id: i64) -> Result<&str, LabelError> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .map(String::as_str)
            .ok_or(LabelError::UnknownClass {
                class_id,
                class_count: self.labels.len(),
            })
    }

    /// Check the table against class names declared in model metadata.
    ///
    /// Accepts a JSON array (`["missing hole", ...]`) or a comma-separated list.
    pub fn verify_declared(&self, declared: &str) -> Result<(), LabelError> {
        let declared = parse_declared_names(declared);

        if declared.len() != self.labels.len() {
            return Err(LabelError::CountMismatch {
                expected: self.labels.len(),
                actual: declared.len(),
            });
        }

        for (index, (declared, configured)) in declared.iter().zip(self.labels.iter()).enumerate() {
            if !declared.eq_ignore_ascii_case(configured) {
                return Err(LabelError::DeclaredMismatch {
                    index,
                    declared: declared.clone(),
                    configured: configured.clone(),
                });
            }
        }

        Ok(())
    }
}

fn parse_declared_names(raw: &str) -> Vec<String> {
    if let Ok(names) = serde_json::from_str::<Vec<String>>(raw) {
        return names.into_iter().map(|n| n.trim().to_string()).collect();
    }

    raw.split(',')
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}
