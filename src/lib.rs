// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod version;
pub mod vision;

pub use api::{create_app, start_server, AppState};
pub use config::ServiceConfig;
pub use models::{ClassifierProvider, ProvisionError};
pub use pipeline::{PipelineConfig, PipelineError, PipelineOutcome, PredictionPipeline, Upload};
pub use vision::{ClassLabelTable, FractureClassifier, InferenceAdapter, Prediction};
