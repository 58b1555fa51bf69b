// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! One-time classifier provisioning
//!
//! `ClassifierProvider` is owned by the composition root and handed to the
//! pipeline. The first caller triggers the loader; concurrent callers wait on
//! that same initialization instead of starting their own.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::artifact_store::{ArtifactError, ArtifactStore};
use crate::vision::{ClassLabelTable, ClassifierError, InferenceAdapter, OnnxClassifier};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Classifier artifact not found at {0} and no artifact store is configured")]
    MissingArtifact(PathBuf),
    #[error("Artifact fetch failed: {0}")]
    Fetch(#[from] ArtifactError),
    #[error("Artifact fetch timed out after {0:?}")]
    FetchTimeout(Duration),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Classifier initialization task failed: {0}")]
    Join(String),
}

/// Produces a ready inference adapter
///
/// Called at most once per successful provisioning.
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<InferenceAdapter>, ProvisionError>;
}

/// Loader that fetches the ONNX artifact on demand and opens it with ONNX Runtime
pub struct ArtifactClassifierLoader {
    pub store: Option<Arc<dyn ArtifactStore>>,
    pub artifact_key: String,
    pub model_path: PathBuf,
    pub labels: ClassLabelTable,
    pub intra_threads: usize,
    pub fetch_timeout: Duration,
}

impl ArtifactClassifierLoader {
    /// Make sure the artifact exists at `model_path`, fetching it if needed
    pub async fn ensure_artifact(&self) -> Result<(), ProvisionError> {
        if tokio::fs::try_exists(&self.model_path).await.unwrap_or(false) {
            info!("Using cached classifier artifact at {}", self.model_path.display());
            return Ok(());
        }

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ProvisionError::MissingArtifact(self.model_path.clone()))?;

        if let Some(parent) = self.model_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ArtifactError::from)?;
            }
        }

        info!(
            "📥 Fetching classifier artifact '{}' from {}",
            self.artifact_key,
            store.location()
        );

        let bytes = tokio::time::timeout(
            self.fetch_timeout,
            store.fetch(&self.artifact_key, &self.model_path),
        )
        .await
        .map_err(|_| ProvisionError::FetchTimeout(self.fetch_timeout))??;

        info!("✅ Classifier artifact stored at {} ({} bytes)", self.model_path.display(), bytes);
        Ok(())
    }
}

#[async_trait]
impl ClassifierLoader for ArtifactClassifierLoader {
    async fn load(&self) -> Result<Arc<InferenceAdapter>, ProvisionError> {
        self.ensure_artifact().await?;

        let path = self.model_path.clone();
        let threads = self.intra_threads;
        let classifier = tokio::task::spawn_blocking(move || OnnxClassifier::load(path, threads))
            .await
            .map_err(|e| ProvisionError::Join(e.to_string()))??;

        Ok(Arc::new(InferenceAdapter::new(
            Arc::new(classifier),
            self.labels.clone(),
        )))
    }
}

/// Lazily initialized, process-wide inference adapter
pub struct ClassifierProvider {
    loader: Arc<dyn ClassifierLoader>,
    adapter: OnceCell<Arc<InferenceAdapter>>,
}

impl std::fmt::Debug for ClassifierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierProvider")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

struct PreloadedLoader(Arc<InferenceAdapter>);

#[async_trait]
impl ClassifierLoader for PreloadedLoader {
    async fn load(&self) -> Result<Arc<InferenceAdapter>, ProvisionError> {
        Ok(self.0.clone())
    }
}

impl ClassifierProvider {
    pub fn new(loader: Arc<dyn ClassifierLoader>) -> Self {
        Self {
            loader,
            adapter: OnceCell::new(),
        }
    }

    /// Provider that is ready from the start
    pub fn from_adapter(adapter: Arc<InferenceAdapter>) -> Self {
        Self {
            loader: Arc::new(PreloadedLoader(adapter.clone())),
            adapter: OnceCell::new_with(Some(adapter)),
        }
    }

    /// Get the adapter, initializing it on first use
    ///
    /// A failed initialization is not cached; the next call tries again.
    pub async fn get(&self) -> Result<Arc<InferenceAdapter>, ProvisionError> {
        self.adapter
            .get_or_try_init(|| async {
                info!("🧠 Initializing fracture classifier");
                let adapter = self.loader.load().await;
                if let Err(ref e) = adapter {
                    warn!("⚠️ Classifier initialization failed: {}", e);
                }
                adapter
            })
            .await
            .cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.adapter.initialized()
    }
}
