// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response bodies for the prediction endpoints

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelinePrediction;

pub const WELCOME_MESSAGE: &str = "Welcome to the fracture prediction API";
pub const NO_IMAGES_MESSAGE: &str = "No images were uploaded. Please upload at least one image.";
pub const BLURRY_MESSAGE: &str =
    "All uploaded images are too blurry. Please upload clearer images.";
pub const SUCCESS_MESSAGE: &str = "File uploaded and processed successfully";

/// Plain `{"message": ...}` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn welcome() -> Self {
        Self {
            message: WELCOME_MESSAGE.to_string(),
        }
    }
}

/// Successful prediction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub message: String,
    /// Declared file name of the sharpest upload
    pub clearest_image: String,
    pub predicted_class: String,
    /// Probability of the predicted class (0.0-1.0)
    pub confidence: f32,
}

impl From<PipelinePrediction> for UploadResponse {
    fn from(prediction: PipelinePrediction) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            clearest_image: prediction.filename,
            predicted_class: prediction.label,
            confidence: prediction.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub version: String,
}
