// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request orchestration: validate, select, classify

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::selection::scan_batch;
use super::upload::{Upload, UploadSpool};
use crate::models::{ClassifierProvider, ProvisionError};
use crate::vision::{preprocess_for_classification, ChannelOrder, ClassifierError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Upload storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Inference(#[from] ClassifierError),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Background task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Uploads must score strictly above this to be considered
    pub min_sharpness: f64,
    pub channel_order: ChannelOrder,
    pub inference_timeout: Duration,
    /// Root under which per-request spools are created
    pub upload_dir: PathBuf,
    pub retain_uploads: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_sharpness: 0.0,
            channel_order: ChannelOrder::Rgb,
            inference_timeout: Duration::from_secs(30),
            upload_dir: PathBuf::from("./uploads"),
            retain_uploads: false,
        }
    }
}

/// Prediction for the sharpest upload of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePrediction {
    /// Declared file name of the selected upload
    pub filename: String,
    pub label: String,
    pub confidence: f32,
    pub sharpness: f64,
    /// Uploads in the batch
    pub considered: usize,
    /// Uploads that decoded
    pub decodable: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    RejectedEmpty,
    RejectedBlurry,
    Success(PipelinePrediction),
}

/// Runs one request's uploads through selection and classification
pub struct PredictionPipeline {
    provider: Arc<ClassifierProvider>,
    config: PipelineConfig,
}

impl PredictionPipeline {
    pub fn new(provider: Arc<ClassifierProvider>, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<ClassifierProvider> {
        &self.provider
    }

    pub async fn run(&self, uploads: Vec<Upload>) -> Result<PipelineOutcome, PipelineError> {
        if uploads.is_empty() {
            debug!("Rejecting empty upload batch");
            return Ok(PipelineOutcome::RejectedEmpty);
        }

        let start = Instant::now();
        let considered = uploads.len();
        let adapter = self.provider.get().await?;

        // Dropping the spool removes it on every return below
        let spool = UploadSpool::create(&self.config.upload_dir, self.config.retain_uploads)?;
        let mut stored = Vec::with_capacity(considered);
        for (index, upload) in uploads.iter().enumerate() {
            stored.push(spool.store(index, upload).await?);
        }
        drop(uploads);

        let threshold = self.config.min_sharpness;
        let scan = tokio::task::spawn_blocking(move || scan_batch(stored, threshold))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;

        let Some(sharpest) = scan.sharpest else {
            info!(
                "All {} uploads rejected as blurry ({} decodable)",
                considered, scan.decodable
            );
            return Ok(PipelineOutcome::RejectedBlurry);
        };

        let (selected, image) = sharpest.item;
        info!(
            "Selected '{}' with sharpness {:.3} out of {} uploads",
            selected.filename, sharpest.score, considered
        );

        let order = self.config.channel_order;
        let timeout = self.config.inference_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let tensor = preprocess_for_classification(&image, order);
            adapter.predict(&tensor)
        });
        let prediction = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| PipelineError::Timeout(timeout))?
            .map_err(|e| PipelineError::Join(e.to_string()))??;

        info!(
            "Predicted '{}' ({:.4}) for '{}' in {:?}",
            prediction.label,
            prediction.confidence,
            selected.filename,
            start.elapsed()
        );

        Ok(PipelineOutcome::Success(PipelinePrediction {
            filename: selected.filename,
            label: prediction.label,
            confidence: prediction.confidence,
            sharpness: sharpest.score,
            considered,
            decodable: scan.decodable,
        }))
    }
}
