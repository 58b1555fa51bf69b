// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fracture classifier inference
//!
//! `FractureClassifier` is the one seam between the pipeline and whatever
//! engine runs the trained network. `OnnxClassifier` is the production
//! implementation; `InferenceAdapter` maps its output onto the label table.

use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

use super::labels::ClassLabelTable;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to load classifier: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Classifier returned {actual} scores but the label table has {expected} classes")]
    OutputMismatch { expected: usize, actual: usize },

    #[error("Classifier returned a non-finite score at index {0}")]
    NonFiniteScore(usize),
}

/// Raw classifier output
///
/// Only built through `from_probabilities`, so `index` is always the argmax.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    index: usize,
    probabilities: Vec<f32>,
}

impl Classification {
    /// Build a classification from a probability vector
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, ClassifierError> {
        if let Some(bad) = probabilities.iter().position(|p| !p.is_finite()) {
            return Err(ClassifierError::NonFiniteScore(bad));
        }
        let (index, _) = argmax(&probabilities)
            .ok_or_else(|| ClassifierError::Inference("classifier returned no scores".to_string()))?;
        Ok(Self {
            index,
            probabilities,
        })
    }

    /// Index of the highest probability
    pub fn index(&self) -> usize {
        self.index
    }

    /// Probability per output slot
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Probability at the argmax slot
    pub fn confidence(&self) -> f32 {
        self.probabilities[self.index]
    }
}

/// Labelled prediction for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// Index and value of the largest element; the first one wins on ties
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if v <= bv => best,
            _ => Some((i, v)),
        })
}

/// Anything that turns a preprocessed tensor into class probabilities
///
/// Implementations do not validate the tensor shape themselves; a shape the
/// engine rejects surfaces as `ClassifierError::Inference`.
pub trait FractureClassifier: Send + Sync {
    fn classify(&self, input: &Array4<f32>) -> Result<Classification, ClassifierError>;
}

fn load_err<E: std::fmt::Display>(stage: &str, e: E) -> ClassifierError {
    ClassifierError::Load(format!("{}: {}", stage, e))
}

/// ONNX Runtime backed classifier
///
/// Runs on CPU. The session is shared behind a mutex so concurrent requests
/// serialize at the `run` call.
#[derive(Clone)]
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Load the classifier from an ONNX file
    ///
    /// # Errors
    /// Returns `ClassifierError::Load` if the file is missing or ONNX Runtime
    /// cannot build a session from it.
    pub fn load<P: AsRef<Path>>(model_path: P, intra_threads: usize) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            return Err(ClassifierError::Load(format!(
                "classifier artifact not found: {}",
                model_path.display()
            )));
        }

        info!("Loading fracture classifier from {}", model_path.display());

        let session = Session::builder()
            .map_err(|e| load_err("Failed to create session builder", e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| load_err("Failed to set CPU execution provider", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err("Failed to set optimization level", e))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| load_err("Failed to set intra threads", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                load_err(
                    &format!("Failed to load classifier from {}", model_path.display()),
                    e,
                )
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input_1".to_string());

        if let Some(input) = session.inputs.first() {
            debug!("Classifier input '{}': {:?}", input.name, input.input_type);
        }

        info!("✅ Fracture classifier loaded (CPU-only)");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
        })
    }
}

impl FractureClassifier for OnnxClassifier {
    fn classify(&self, input: &Array4<f32>) -> Result<Classification, ClassifierError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("classifier session lock poisoned".to_string()))?;

        let input_value = Value::from_array(input.to_owned())
            .map_err(|e| ClassifierError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        debug!("Classifier output shape: {:?}", output_tensor.shape());

        // [1, classes] -> [classes]
        let probabilities: Vec<f32> = output_tensor.iter().copied().collect();
        Classification::from_probabilities(probabilities)
    }
}

/// Classifier paired with its label table
pub struct InferenceAdapter {
    classifier: Arc<dyn FractureClassifier>,
    labels: ClassLabelTable,
}

impl std::fmt::Debug for InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl InferenceAdapter {
    pub fn new(classifier: Arc<dyn FractureClassifier>, labels: ClassLabelTable) -> Self {
        Self { classifier, labels }
    }

    pub fn labels(&self) -> &ClassLabelTable {
        &self.labels
    }

    /// Classify a preprocessed tensor and name the winning class
    ///
    /// The confidence is the raw maximum probability; it is not renormalized.
    pub fn predict(&self, input: &Array4<f32>) -> Result<Prediction, ClassifierError> {
        let classification = self.classifier.classify(input)?;

        let scores = classification.probabilities().len();
        if scores != self.labels.len() {
            return Err(ClassifierError::OutputMismatch {
                expected: self.labels.len(),
                actual: scores,
            });
        }

        let label = self
            .labels
            .get(classification.index())
            .ok_or(ClassifierError::OutputMismatch {
                expected: self.labels.len(),
                actual: scores,
            })?
            .to_string();

        Ok(Prediction {
            label,
            confidence: classification.confidence(),
        })
    }
}
