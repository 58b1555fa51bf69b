// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image analysis for fracture triage
//!
//! This module provides:
//! - Upload decoding and format detection
//! - Laplacian-variance sharpness scoring
//! - Preprocessing into the classifier's fixed NHWC tensor
//! - The classifier seam and its ONNX Runtime implementation
//!
//! Everything here is synchronous and CPU-bound; callers run it on the
//! blocking pool.

pub mod classifier;
pub mod image_utils;
pub mod labels;
pub mod preprocessing;
pub mod sharpness;

pub use classifier::{
    argmax, Classification, ClassifierError, FractureClassifier, InferenceAdapter, OnnxClassifier,
    Prediction,
};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use labels::{ClassLabelTable, FRACTURE_CLASSES};
pub use preprocessing::{
    preprocess_for_classification, preprocess_image_bytes, ChannelOrder, CLASSIFIER_INPUT_SIZE,
};
pub use sharpness::{laplacian_variance, score_image_bytes, sharpness_score};
