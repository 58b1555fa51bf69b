// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Selection and prediction pipeline
//!
//! One request's uploads are spooled into a scoped directory, scored for
//! sharpness, and the sharpest decodable one is classified.

pub mod predictor;
pub mod selection;
pub mod upload;

pub use predictor::{
    PipelineConfig, PipelineError, PipelineOutcome, PipelinePrediction, PredictionPipeline,
};
pub use selection::{assess_upload, scan_batch, BatchScan, Selected, SharpestSelector, UploadAssessment};
pub use upload::{sanitize_filename, StoredUpload, Upload, UploadSpool};
