// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Artifact stores against a local HTTP server and a scratch directory

use axum::{body::Body, extract::State, http::StatusCode, routing::get, Router};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use fracture_api::models::{
    artifact_store_from_location, ArtifactError, ArtifactStore, ArtifactStoreConfig,
    HttpArtifactStore, RetryPolicy,
};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const ARTIFACT: &[u8] = b"onnx-bytes-for-the-fracture-classifier";

#[derive(Clone)]
struct ServerState {
    hits: Arc<AtomicUsize>,
    /// Requests to /flaky/ answered with 503 before succeeding
    failures: usize,
}

async fn artifact() -> Vec<u8> {
    ARTIFACT.to_vec()
}

async fn flaky(State(state): State<ServerState>) -> Result<Vec<u8>, StatusCode> {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    if hit < state.failures {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(ARTIFACT.to_vec())
    }
}

/// Sends the first chunk of the artifact and then never finishes
async fn stalled() -> Body {
    let head = stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(&ARTIFACT[..8])) });
    Body::from_stream(head.chain(stream::pending()))
}

fn dir_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

async fn spawn_server(failures: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/store/fracture_classes.onnx", get(artifact))
        .route("/store/v2/fracture_classes.onnx", get(artifact))
        .route("/flaky/fracture_classes.onnx", get(flaky))
        .route("/stalled/fracture_classes.onnx", get(stalled))
        .with_state(ServerState {
            hits: hits.clone(),
            failures,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn fast_config(expected_sha256: Option<String>) -> ArtifactStoreConfig {
    ArtifactStoreConfig {
        request_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            exponential_base: 2.0,
        },
        expected_sha256,
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[tokio::test]
async fn test_http_fetch_writes_artifact() {
    let (addr, _) = spawn_server(0).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let store = HttpArtifactStore::new(
        Url::parse(&format!("http://{}/store", addr)).unwrap(),
        fast_config(Some(sha256_hex(ARTIFACT).to_uppercase())),
    )
    .unwrap();

    let bytes = store.fetch("fracture_classes.onnx", &dest).await.unwrap();
    assert_eq!(bytes, ARTIFACT.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), ARTIFACT);
    assert_eq!(dir_entries(dir.path()), 1);

    store.fetch("v2/fracture_classes.onnx", &dest).await.unwrap();
    assert_eq!(dir_entries(dir.path()), 1);
}

#[tokio::test]
async fn test_http_checksum_mismatch_leaves_nothing_behind() {
    let (addr, _) = spawn_server(0).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let store = artifact_store_from_location(
        &format!("http://{}/store/", addr),
        fast_config(Some("0".repeat(64))),
    )
    .unwrap();

    let result = store.fetch("fracture_classes.onnx", &dest).await;
    assert!(matches!(result, Err(ArtifactError::ChecksumMismatch { .. })));
    assert!(!dest.exists());
    assert_eq!(dir_entries(dir.path()), 0);
}

#[tokio::test]
async fn test_cancelled_fetch_leaves_nothing_behind() {
    let (addr, _) = spawn_server(0).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let store = artifact_store_from_location(&format!("http://{}/stalled", addr), fast_config(None))
        .unwrap();
    let task = {
        let dest = dest.clone();
        tokio::spawn(async move { store.fetch("fracture_classes.onnx", &dest).await })
    };

    // Wait until the download is being staged next to the destination
    let mut staged = false;
    for _ in 0..100 {
        if dir_entries(dir.path()) > 0 {
            staged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(staged, "download never started");

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(!dest.exists());
    assert_eq!(dir_entries(dir.path()), 0);
}

#[tokio::test]
async fn test_timed_out_fetch_leaves_nothing_behind() {
    let (addr, _) = spawn_server(0).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let store = artifact_store_from_location(&format!("http://{}/stalled", addr), fast_config(None))
        .unwrap();
    let result = tokio::time::timeout(
        Duration::from_millis(300),
        store.fetch("fracture_classes.onnx", &dest),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(dir_entries(dir.path()), 0);
}

#[tokio::test]
async fn test_http_missing_object_is_not_retried() {
    let (addr, _) = spawn_server(0).await;
    let dir = tempfile::tempdir().unwrap();

    let store = artifact_store_from_location(&format!("http://{}/store", addr), fast_config(None))
        .unwrap();
    let result = store.fetch("missing.onnx", &dir.path().join("x.onnx")).await;
    assert!(matches!(result, Err(ArtifactError::NotFound(_))));
}

#[tokio::test]
async fn test_http_retries_transient_failures() {
    let (addr, hits) = spawn_server(2).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let store = artifact_store_from_location(&format!("http://{}/flaky", addr), fast_config(None))
        .unwrap();
    store.fetch("fracture_classes.onnx", &dest).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::read(&dest).unwrap(), ARTIFACT);
}

#[tokio::test]
async fn test_http_gives_up_after_max_retries() {
    let (addr, hits) = spawn_server(100).await;
    let dir = tempfile::tempdir().unwrap();

    let store = artifact_store_from_location(&format!("http://{}/flaky", addr), fast_config(None))
        .unwrap();
    let result = store
        .fetch("fracture_classes.onnx", &dir.path().join("model.onnx"))
        .await;

    assert!(matches!(
        result,
        Err(ArtifactError::MaxRetriesExceeded { attempts: 4, .. })
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_directory_store_from_plain_path() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("fracture_classes.onnx"), ARTIFACT).unwrap();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("model.onnx");

    let location = root.path().to_str().unwrap();
    let store = artifact_store_from_location(location, fast_config(Some(sha256_hex(ARTIFACT))))
        .unwrap();
    store.fetch("fracture_classes.onnx", &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), ARTIFACT);

    let escape = store.fetch("../fracture_classes.onnx", &dest).await;
    assert!(matches!(escape, Err(ArtifactError::InvalidKey(_))));
}

#[test]
fn test_unsupported_scheme_is_rejected() {
    let result = artifact_store_from_location("ftp://example.com/models", fast_config(None));
    assert!(matches!(result, Err(ArtifactError::InvalidLocation(_))));
}
