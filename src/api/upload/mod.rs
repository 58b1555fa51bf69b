// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fracture prediction endpoints
//!
//! Provides GET /, GET /health and POST /upload/.

pub mod handler;
pub mod response;

pub use handler::{health_handler, root_handler, upload_handler};
pub use response::{HealthResponse, MessageResponse, UploadResponse};
