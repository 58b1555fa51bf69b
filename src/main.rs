// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use fracture_api::{
    api::{start_server, AppState},
    config::ServiceConfig,
    models::ClassifierProvider,
    pipeline::PredictionPipeline,
    version,
};
use std::{env, sync::Arc};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("🚀 Starting {}", version::get_version_string());

    let config = ServiceConfig::parse();
    config.validate().context("Invalid configuration")?;

    info!("Model path: {}", config.model_path.display());
    match &config.artifact_store {
        Some(store) => info!("Artifact store: {} (key '{}')", store, config.artifact_key),
        None => info!("No artifact store configured; the model must exist locally"),
    }
    info!(
        "Upload dir: {} (retain: {}), min sharpness: {}, channel order: {}",
        config.upload_dir.display(),
        config.retain_uploads,
        config.min_sharpness,
        config.channel_order
    );

    let loader = config.classifier_loader()?;
    let provider = Arc::new(ClassifierProvider::new(Arc::new(loader)));

    if config.preload_model {
        match provider.get().await {
            Ok(adapter) => info!("✅ Classifier preloaded ({} classes)", adapter.labels().len()),
            Err(e) => warn!("⚠️ Classifier preload failed, will retry on first upload: {}", e),
        }
    }

    let pipeline = Arc::new(PredictionPipeline::new(provider, config.pipeline_config()));
    let state = AppState::new(pipeline).with_max_upload_bytes(config.max_upload_bytes);

    start_server(config.socket_addr()?, state).await
}
