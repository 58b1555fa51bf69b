// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Remote storage for the classifier artifact
//!
//! A store is identified by a location (`https://…`, `s3://bucket`,
//! `file:///…` or a plain directory) and serves objects by key.

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Artifact store returned HTTP {status} for {url}")]
    Http { status: u16, url: String },
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checksum mismatch - expected: {expected}, actual: {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("Invalid artifact store location: {0}")]
    InvalidLocation(String),
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),
    #[error("Max retries exceeded: {attempts} attempts, last error: {last}")]
    MaxRetriesExceeded { attempts: usize, last: String },
}

impl ArtifactError {
    /// Whether another attempt could succeed
    fn is_retryable(&self) -> bool {
        match self {
            ArtifactError::Network(_) => true,
            ArtifactError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStoreConfig {
    /// Per-request timeout for remote stores
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Expected lowercase hex SHA-256 of the artifact, if known
    pub expected_sha256: Option<String>,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            expected_sha256: None,
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Copy the object named `key` to `dest`, returning the number of bytes written
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, ArtifactError>;

    /// Human-readable store location for logs
    fn location(&self) -> String;
}

/// Reject keys that would escape the store root
pub fn validate_key(key: &str) -> Result<(), ArtifactError> {
    let trimmed = key.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ArtifactError::InvalidKey("key is empty".to_string()));
    }
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(ArtifactError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn verify_checksum(expected: Option<&str>, actual: &str) -> Result<(), ArtifactError> {
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(actual) => {
            Err(ArtifactError::ChecksumMismatch {
                expected: expected.to_lowercase(),
                actual: actual.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Staging file next to `dest`, removed on drop unless persisted
///
/// Living in the same directory keeps the final `persist` a plain rename.
fn staging_file(dest: &Path) -> std::io::Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".fetch-")
        .suffix(".part")
        .tempfile_in(dir)
}

/// Object store reached over HTTP(S)
///
/// Objects are read with a plain GET of `{base_url}/{key}`, which covers
/// public S3/GCS buckets and any static file server.
pub struct HttpArtifactStore {
    base_url: Url,
    client: reqwest::Client,
    config: ArtifactStoreConfig,
}

impl HttpArtifactStore {
    pub fn new(base_url: Url, config: ArtifactStoreConfig) -> Result<Self, ArtifactError> {
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ArtifactError::Network(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            config,
        })
    }

    pub fn object_url(&self, key: &str) -> Result<Url, ArtifactError> {
        validate_key(key)?;
        self.base_url
            .join(key.trim_start_matches('/'))
            .map_err(|e| ArtifactError::InvalidKey(format!("{}: {}", key, e)))
    }

    async fn try_fetch(&self, url: &Url, dest: &Path) -> Result<u64, ArtifactError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArtifactError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ArtifactError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ArtifactError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Removed on drop if the fetch fails or is cancelled
        let staging = staging_file(dest)?;
        let mut file = tokio::fs::File::from_std(staging.reopen()?);
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ArtifactError::Network(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        verify_checksum(self.config.expected_sha256.as_deref(), &actual)?;
        staging.persist(dest).map_err(|e| e.error)?;
        Ok(written)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, ArtifactError> {
        let url = self.object_url(key)?;
        let policy = &self.config.retry_policy;
        let mut attempt = 0;

        loop {
            match self.try_fetch(&url, dest).await {
                Ok(bytes) => {
                    info!("Fetched {} bytes from {}", bytes, url);
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= policy.max_retries {
                        return Err(ArtifactError::MaxRetriesExceeded {
                            attempts: attempt + 1,
                            last: e.to_string(),
                        });
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "Artifact fetch attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn location(&self) -> String {
        self.base_url.to_string()
    }
}

/// Store backed by a local directory
pub struct FileSystemArtifactStore {
    root: PathBuf,
    expected_sha256: Option<String>,
}

impl FileSystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>, expected_sha256: Option<String>) -> Self {
        Self {
            root: root.into(),
            expected_sha256,
        }
    }
}

#[async_trait]
impl ArtifactStore for FileSystemArtifactStore {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, ArtifactError> {
        validate_key(key)?;
        let source = self.root.join(key.trim_start_matches('/'));
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(ArtifactError::NotFound(source.display().to_string()));
        }

        let bytes = tokio::fs::read(&source).await?;
        let actual = hex::encode(Sha256::digest(&bytes));
        verify_checksum(self.expected_sha256.as_deref(), &actual)?;

        let staging = staging_file(dest)?;
        tokio::fs::write(staging.path(), &bytes).await?;
        staging.persist(dest).map_err(|e| e.error)?;

        debug!("Copied {} bytes from {}", bytes.len(), source.display());
        Ok(bytes.len() as u64)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Build a store from its location string
///
/// - `http://…` / `https://…`: HTTP object store
/// - `s3://bucket[/prefix]`: public bucket via its virtual-hosted HTTPS endpoint
/// - `file:///dir` or a bare path: local directory
pub fn artifact_store_from_location(
    location: &str,
    config: ArtifactStoreConfig,
) -> Result<Arc<dyn ArtifactStore>, ArtifactError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(ArtifactError::InvalidLocation("location is empty".to_string()));
    }

    match Url::parse(location) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Arc::new(HttpArtifactStore::new(url, config)?)),
            "s3" => {
                let bucket = url
                    .host_str()
                    .ok_or_else(|| ArtifactError::InvalidLocation(location.to_string()))?;
                let endpoint = format!("https://{}.s3.amazonaws.com{}", bucket, url.path());
                let endpoint = Url::parse(&endpoint)
                    .map_err(|e| ArtifactError::InvalidLocation(format!("{}: {}", location, e)))?;
                Ok(Arc::new(HttpArtifactStore::new(endpoint, config)?))
            }
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|_| ArtifactError::InvalidLocation(location.to_string()))?;
                Ok(Arc::new(FileSystemArtifactStore::new(root, config.expected_sha256)))
            }
            // Windows drive letters parse as a one-letter scheme
            scheme if scheme.len() == 1 => Ok(Arc::new(FileSystemArtifactStore::new(
                location,
                config.expected_sha256,
            ))),
            other => Err(ArtifactError::InvalidLocation(format!(
                "unsupported scheme '{}'",
                other
            ))),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Arc::new(
            FileSystemArtifactStore::new(location, config.expected_sha256),
        )),
        Err(e) => Err(ArtifactError::InvalidLocation(format!("{}: {}", location, e))),
    }
}
