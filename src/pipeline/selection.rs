// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sharpest-image selection over a batch of uploads

use image::DynamicImage;
use std::path::Path;
use tracing::{debug, warn};

use super::upload::StoredUpload;
use crate::vision::{decode_image_bytes, sharpness_score, ImageError};

/// Result of scoring one stored upload
///
/// An undecodable file is skipped; only I/O failures abort the batch.
#[derive(Debug)]
pub enum UploadAssessment {
    Scored { image: DynamicImage, score: f64 },
    DecodeFailure(ImageError),
}

/// Read, decode and score a stored upload
pub fn assess_upload(path: &Path) -> std::io::Result<UploadAssessment> {
    let data = std::fs::read(path)?;
    Ok(match decode_image_bytes(&data) {
        Ok((image, info)) => {
            debug!(
                "Decoded {} ({}x{} {:?})",
                path.display(),
                info.width,
                info.height,
                info.format
            );
            let score = sharpness_score(&image);
            UploadAssessment::Scored { image, score }
        }
        Err(e) => UploadAssessment::DecodeFailure(e),
    })
}

/// The winning candidate of a batch
#[derive(Debug, Clone)]
pub struct Selected<T> {
    pub index: usize,
    pub score: f64,
    pub item: T,
}

/// Running strict maximum over scored candidates
///
/// A candidate must score strictly above both the threshold and the current
/// best, so on ties the earliest candidate is kept.
#[derive(Debug)]
pub struct SharpestSelector<T> {
    threshold: f64,
    best: Option<Selected<T>>,
}

impl<T> SharpestSelector<T> {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            best: None,
        }
    }

    /// Offer a candidate; returns true if it became the new best
    pub fn offer(&mut self, index: usize, score: f64, item: T) -> bool {
        let bar = self.best.as_ref().map_or(self.threshold, |b| b.score);
        if score > bar {
            self.best = Some(Selected { index, score, item });
            true
        } else {
            false
        }
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.score)
    }

    pub fn finish(self) -> Option<Selected<T>> {
        self.best
    }
}

/// Outcome of scanning a whole batch
#[derive(Debug)]
pub struct BatchScan {
    pub sharpest: Option<Selected<(StoredUpload, DynamicImage)>>,
    /// Number of uploads that decoded
    pub decodable: usize,
}

/// Score every stored upload and keep the sharpest decoded image
///
/// Blocking; run it off the async runtime.
pub fn scan_batch(uploads: Vec<StoredUpload>, threshold: f64) -> std::io::Result<BatchScan> {
    let mut selector = SharpestSelector::new(threshold);
    let mut decodable = 0;

    for upload in uploads {
        match assess_upload(&upload.path)? {
            UploadAssessment::Scored { image, score } => {
                decodable += 1;
                debug!("Sharpness of '{}': {:.3}", upload.filename, score);
                let index = upload.index;
                selector.offer(index, score, (upload, image));
            }
            UploadAssessment::DecodeFailure(e) => {
                warn!("Skipping undecodable upload '{}': {}", upload.filename, e);
            }
        }
    }

    Ok(BatchScan {
        sharpest: selector.finish(),
        decodable,
    })
}
