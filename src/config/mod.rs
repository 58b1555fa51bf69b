// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration from command-line flags and environment

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::DEFAULT_MAX_UPLOAD_BYTES;
use crate::models::artifact_store::validate_key;
use crate::models::{
    artifact_store_from_location, ArtifactClassifierLoader, ArtifactStore, ArtifactStoreConfig,
};
use crate::pipeline::PipelineConfig;
use crate::vision::{ChannelOrder, ClassLabelTable};

/// Fracture prediction HTTP service
#[derive(Parser, Debug, Clone)]
#[command(name = "fracture-api", version, about)]
pub struct ServiceConfig {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Local path of the ONNX classifier
    #[arg(long, env = "MODEL_PATH", default_value = "./models/fracture_classes.onnx")]
    pub model_path: PathBuf,

    /// Where to fetch the classifier from when it is not present locally
    /// (http(s)://, s3://bucket, file:// or a directory)
    #[arg(long, env = "ARTIFACT_STORE_URL")]
    pub artifact_store: Option<String>,

    /// Object key of the classifier within the artifact store
    #[arg(long, env = "ARTIFACT_KEY", default_value = "fracture_classes.onnx")]
    pub artifact_key: String,

    /// Expected SHA-256 of the fetched artifact (hex)
    #[arg(long, env = "ARTIFACT_SHA256")]
    pub artifact_sha256: Option<String>,

    /// JSON array of class labels, in model output order
    #[arg(long, env = "CLASS_LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// Directory under which request uploads are spooled
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Keep spooled uploads after each request
    #[arg(long, env = "RETAIN_UPLOADS")]
    pub retain_uploads: bool,

    /// Uploads must score strictly above this sharpness
    #[arg(long, env = "MIN_SHARPNESS", default_value_t = 0.0)]
    pub min_sharpness: f64,

    /// Channel order the classifier was trained on (rgb/bgr)
    #[arg(long, env = "CHANNEL_ORDER", default_value = "rgb")]
    pub channel_order: ChannelOrder,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "ORT_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 300)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "INFERENCE_TIMEOUT_SECS", default_value_t = 30)]
    pub inference_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Load the classifier at startup instead of on the first upload
    #[arg(long, env = "PRELOAD_MODEL")]
    pub preload_model: bool,
}

impl ServiceConfig {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        self.host
            .parse::<IpAddr>()
            .with_context(|| format!("Invalid host address '{}'", self.host))?;

        if self.model_path.as_os_str().is_empty() {
            bail!("Model path must not be empty");
        }
        if !self.min_sharpness.is_finite() || self.min_sharpness < 0.0 {
            bail!("min_sharpness must be a non-negative number, got {}", self.min_sharpness);
        }
        if self.intra_threads == 0 {
            bail!("intra_threads must be at least 1");
        }
        if self.fetch_timeout_secs == 0 || self.inference_timeout_secs == 0 {
            bail!("Timeouts must be at least one second");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be positive");
        }
        if let Some(sha) = &self.artifact_sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("artifact_sha256 must be 64 hex characters");
            }
        }
        if self.artifact_store.is_some() {
            validate_key(&self.artifact_key)?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .with_context(|| format!("Invalid host address '{}'", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn labels(&self) -> Result<ClassLabelTable> {
        match &self.labels_path {
            Some(path) => {
                let labels = ClassLabelTable::from_json_file(path)?;
                info!("Loaded {} class labels from {}", labels.len(), path.display());
                Ok(labels)
            }
            None => Ok(ClassLabelTable::default()),
        }
    }

    pub fn artifact_store(&self) -> Result<Option<Arc<dyn ArtifactStore>>> {
        let Some(location) = &self.artifact_store else {
            return Ok(None);
        };
        let config = ArtifactStoreConfig {
            request_timeout: Duration::from_secs(self.fetch_timeout_secs),
            expected_sha256: self.artifact_sha256.clone(),
            ..Default::default()
        };
        let store = artifact_store_from_location(location, config)
            .with_context(|| format!("Invalid artifact store '{}'", location))?;
        Ok(Some(store))
    }

    pub fn classifier_loader(&self) -> Result<ArtifactClassifierLoader> {
        Ok(ArtifactClassifierLoader {
            store: self.artifact_store()?,
            artifact_key: self.artifact_key.clone(),
            model_path: self.model_path.clone(),
            labels: self.labels()?,
            intra_threads: self.intra_threads,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_sharpness: self.min_sharpness,
            channel_order: self.channel_order,
            inference_timeout: Duration::from_secs(self.inference_timeout_secs),
            upload_dir: self.upload_dir.clone(),
            retain_uploads: self.retain_uploads,
        }
    }
}
