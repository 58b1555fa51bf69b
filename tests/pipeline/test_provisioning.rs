// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! One-time classifier provisioning under concurrent first requests

use async_trait::async_trait;
use fracture_api::models::{
    ArtifactClassifierLoader, ArtifactError, ArtifactStore, ClassifierLoader, ClassifierProvider,
    ProvisionError,
};
use fracture_api::pipeline::{PipelineConfig, PipelineError, PipelineOutcome, PredictionPipeline, Upload};
use fracture_api::vision::{
    image_utils::encode_png, Classification, ClassLabelTable, ClassifierError, FractureClassifier,
    InferenceAdapter,
};
use futures::future::join_all;
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store that counts fetches and can be told to fail
struct CountingStore {
    fetches: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl CountingStore {
    fn new(delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay,
        }
    }
}

#[async_trait]
impl ArtifactStore for CountingStore {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<u64, ArtifactError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(ArtifactError::NotFound(key.to_string()));
        }
        let payload = b"fake onnx bytes";
        tokio::fs::write(dest, payload).await?;
        Ok(payload.len() as u64)
    }

    fn location(&self) -> String {
        "memory://test".to_string()
    }
}

struct Uniform;

impl FractureClassifier for Uniform {
    fn classify(&self, _input: &Array4<f32>) -> Result<Classification, ClassifierError> {
        Classification::from_probabilities(vec![0.1; 10])
    }
}

/// Fetches the artifact like production, then hands out a stand-in classifier
struct FetchingLoader {
    inner: ArtifactClassifierLoader,
    loads: AtomicUsize,
}

#[async_trait]
impl ClassifierLoader for FetchingLoader {
    async fn load(&self) -> Result<Arc<InferenceAdapter>, ProvisionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_artifact().await?;
        Ok(Arc::new(InferenceAdapter::new(
            Arc::new(Uniform),
            self.inner.labels.clone(),
        )))
    }
}

fn loader(store: Arc<CountingStore>, model_dir: &Path, fetch_timeout: Duration) -> Arc<FetchingLoader> {
    Arc::new(FetchingLoader {
        inner: ArtifactClassifierLoader {
            store: Some(store as Arc<dyn ArtifactStore>),
            artifact_key: "fracture_classes.onnx".to_string(),
            model_path: model_dir.join("models").join("fracture_classes.onnx"),
            labels: ClassLabelTable::default(),
            intra_threads: 1,
            fetch_timeout,
        },
        loads: AtomicUsize::new(0),
    })
}

fn striped_png() -> Vec<u8> {
    let img = GrayImage::from_fn(48, 48, |x, y| {
        if (x + y) % 3 == 0 {
            Luma([250u8])
        } else {
            Luma([5u8])
        }
    });
    encode_png(&DynamicImage::ImageLuma8(img)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_fetch_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_millis(100)));
    let loader = loader(store.clone(), dir.path(), Duration::from_secs(5));
    let provider = Arc::new(ClassifierProvider::new(loader.clone()));
    let pipeline = Arc::new(PredictionPipeline::new(
        provider.clone(),
        PipelineConfig {
            upload_dir: dir.path().join("uploads"),
            ..Default::default()
        },
    ));

    let image = striped_png();
    let requests = (0..8).map(|i| {
        let pipeline = pipeline.clone();
        let upload = Upload::new(format!("scan-{}.png", i), image.clone());
        async move { pipeline.run(vec![upload]).await }
    });
    let results = join_all(requests).await;

    for result in results {
        assert!(matches!(result, Ok(PipelineOutcome::Success(_))));
    }
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(provider.is_ready());
    assert!(dir.path().join("models").join("fracture_classes.onnx").exists());
}

#[tokio::test]
async fn test_failed_fetch_is_retried_on_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::ZERO));
    store.failing.store(true, Ordering::SeqCst);
    let provider = Arc::new(ClassifierProvider::new(loader(
        store.clone(),
        dir.path(),
        Duration::from_secs(5),
    )));
    let pipeline = PredictionPipeline::new(
        provider.clone(),
        PipelineConfig {
            upload_dir: dir.path().join("uploads"),
            ..Default::default()
        },
    );

    let first = pipeline.run(vec![Upload::new("a.png", striped_png())]).await;
    assert!(matches!(first, Err(PipelineError::Provision(ProvisionError::Fetch(_)))));
    assert!(!provider.is_ready());

    store.failing.store(false, Ordering::SeqCst);
    let second = pipeline.run(vec![Upload::new("a.png", striped_png())]).await;
    assert!(matches!(second, Ok(PipelineOutcome::Success(_))));
    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_slow_fetch_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_secs(2)));
    let loader = loader(store, dir.path(), Duration::from_millis(50));

    let result = loader.load().await;
    assert!(matches!(result, Err(ProvisionError::FetchTimeout(_))));
}

#[tokio::test]
async fn test_existing_artifact_skips_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("models");
    std::fs::create_dir_all(&model_dir).unwrap();
    std::fs::write(model_dir.join("fracture_classes.onnx"), b"already here").unwrap();

    let store = Arc::new(CountingStore::new(Duration::ZERO));
    let loader = loader(store.clone(), dir.path(), Duration::from_secs(1));
    loader.load().await.unwrap();

    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
}
