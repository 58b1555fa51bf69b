// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Uploaded files and their request-scoped storage

use bytes::Bytes;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// One file from a multipart request
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as declared by the client
    pub filename: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// An upload written into the spool
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Position in the request batch
    pub index: usize,
    /// File name as declared by the client
    pub filename: String,
    pub path: PathBuf,
}

/// Strip directories and unsafe characters from a client file name
///
/// The result never contains path separators and is never empty.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Temporary directory holding one request's uploads
///
/// The directory lives inside the configured upload root and is removed when
/// the spool is dropped, on every exit path. With `retain` set it is left in
/// place instead.
#[derive(Debug)]
pub struct UploadSpool {
    dir: TempDir,
}

impl UploadSpool {
    pub fn create(root: &Path, retain: bool) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .keep(retain)
            .tempdir_in(root)?;
        debug!("Created upload spool {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an upload into the spool
    ///
    /// Files are prefixed with their batch index so repeated client names do
    /// not collide.
    pub async fn store(&self, index: usize, upload: &Upload) -> std::io::Result<StoredUpload> {
        let name = format!("{:03}-{}", index, sanitize_filename(&upload.filename));
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, &upload.data).await?;
        Ok(StoredUpload {
            index,
            filename: upload.filename.clone(),
            path,
        })
    }
}
