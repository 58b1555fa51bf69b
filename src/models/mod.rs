// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Classifier artifact provisioning
//!
//! - `artifact_store` - where the trained weights live and how they are fetched
//! - `provider` - the one-time cell that turns the artifact into a ready
//!   `InferenceAdapter`

pub mod artifact_store;
pub mod provider;

pub use artifact_store::{
    artifact_store_from_location, ArtifactError, ArtifactStore, ArtifactStoreConfig,
    FileSystemArtifactStore, HttpArtifactStore, RetryPolicy,
};
pub use provider::{ArtifactClassifierLoader, ClassifierLoader, ClassifierProvider, ProvisionError};
