// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction endpoint handlers

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use tracing::{debug, info, warn};

use super::response::{
    HealthResponse, MessageResponse, UploadResponse, BLURRY_MESSAGE, NO_IMAGES_MESSAGE,
};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::pipeline::{PipelineOutcome, Upload};

/// GET / - Liveness greeting
pub async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse::welcome())
}

/// GET /health - Service status and whether the classifier is loaded
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.pipeline.provider().is_ready(),
        version: crate::version::VERSION.to_string(),
    })
}

/// POST /upload/ - Classify the sharpest of the uploaded X-ray images
///
/// Every multipart part with a non-empty file name is treated as an upload.
///
/// # Errors
/// - 400 Bad Request: no uploads, all uploads too blurry, or malformed body
/// - 413 Payload Too Large: body exceeded the upload limit
/// - 500 Internal Server Error: classifier provisioning or inference failed
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let multipart = multipart.map_err(|e| {
        warn!("Rejected upload request: {}", e);
        ApiError::InvalidRequest(e.to_string())
    })?;

    let uploads = collect_uploads(multipart).await?;
    debug!("Upload request with {} files", uploads.len());

    match state.pipeline.run(uploads).await? {
        PipelineOutcome::RejectedEmpty => Err(ApiError::Rejected(NO_IMAGES_MESSAGE.to_string())),
        PipelineOutcome::RejectedBlurry => Err(ApiError::Rejected(BLURRY_MESSAGE.to_string())),
        PipelineOutcome::Success(prediction) => {
            info!(
                "Upload processed: '{}' -> {} ({:.4})",
                prediction.filename, prediction.label, prediction.confidence
            );
            Ok(Json(prediction.into()))
        }
    }
}

async fn collect_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, ApiError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        multipart_error(e)
    })? {
        // Browsers send an empty file input as `filename=""`
        let Some(filename) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            debug!("Ignoring non-file field {:?}", field.name());
            continue;
        };

        let data = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload '{}': {}", filename, e);
            multipart_error(e)
        })?;

        uploads.push(Upload::new(filename, data));
    }

    Ok(uploads)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::InvalidRequest(err.to_string())
    }
}
