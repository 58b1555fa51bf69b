// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fracture class labels, indexed by classifier output slot

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Output order of the bundled fracture classifier
pub const FRACTURE_CLASSES: [&str; 10] = [
    "Avulsion fracture",
    "Comminuted fracture",
    "Fracture Dislocation",
    "Greenstick fracture",
    "Hairline Fracture",
    "Impacted fracture",
    "Longitudinal fracture",
    "Oblique fracture",
    "Pathological fracture",
    "Spiral Fracture",
];

/// Immutable, ordered label table
///
/// Position `i` names the classifier's output slot `i`. Cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabelTable {
    labels: Arc<[String]>,
}

impl Default for ClassLabelTable {
    fn default() -> Self {
        Self {
            labels: FRACTURE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassLabelTable {
    /// Build a table from explicit labels
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            anyhow::bail!("Class label table must not be empty");
        }
        if let Some(blank) = labels.iter().position(|l| l.trim().is_empty()) {
            anyhow::bail!("Class label at index {} is blank", blank);
        }
        Ok(Self {
            labels: labels.into(),
        })
    }

    /// Load a table from a JSON array of strings
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read class labels from {}", path.display()))?;
        let labels: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("Class labels in {} are not a JSON string array", path.display()))?;
        Self::new(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
