use crate::capture;
use affect_core::classifier::ClassifierError;
use affect_core::detector::DetectorError;
use affect_core::{DecodeError, EmotionClassifier, EmotionResult, FaceDetector, PipelineError, SharedModels};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("models unavailable: {0}")]
    ModelsUnavailable(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("inference failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference task failed: {0}")]
    TaskFailed(String),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("failed to spawn loader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Lifecycle of the shared models.
///
/// Only `Ready` hands out models; every other state is reported as unavailable.
pub enum ModelState {
    Uninitialized,
    Loading,
    Ready(Arc<SharedModels>),
    Failed(String),
}

impl ModelState {
    pub fn name(&self) -> &'static str {
        match self {
            ModelState::Uninitialized => "uninitialized",
            ModelState::Loading => "loading",
            ModelState::Ready(_) => "ready",
            ModelState::Failed(_) => "failed",
        }
    }
}

/// Per-process inference settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub threshold: f32,
    pub timeout: Duration,
    pub capture_dir: Option<PathBuf>,
}

/// Clone-safe handle to the model state and inference settings.
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<RwLock<ModelState>>,
    settings: Arc<EngineSettings>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            state: Arc::new(RwLock::new(ModelState::Uninitialized)),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Name of the current lifecycle state.
    pub fn status(&self) -> &'static str {
        self.state.read().unwrap_or_else(|e| e.into_inner()).name()
    }

    /// The loaded models, or `ModelsUnavailable` if they are not ready.
    pub fn models(&self) -> Result<Arc<SharedModels>, EngineError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            ModelState::Ready(models) => Ok(models.clone()),
            ModelState::Uninitialized => Err(EngineError::ModelsUnavailable("models not loaded".into())),
            ModelState::Loading => Err(EngineError::ModelsUnavailable("models still loading".into())),
            ModelState::Failed(reason) => Err(EngineError::ModelsUnavailable(format!(
                "models failed to load: {reason}"
            ))),
        }
    }

    fn set_state(&self, next: ModelState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!(from = state.name(), to = next.name(), "model state transition");
        *state = next;
    }

    pub(crate) fn set_ready(&self, models: SharedModels) {
        self.set_state(ModelState::Ready(Arc::new(models)));
    }

    /// Load both models on a dedicated OS thread.
    ///
    /// The handle reports `loading` until the thread finishes. A load failure
    /// leaves the handle in `failed`; the process keeps serving and answers
    /// predictions with `ModelsUnavailable`.
    pub fn spawn_loader(&self, detector_path: String, classifier_path: String) -> Result<(), EngineError> {
        self.set_state(ModelState::Loading);
        let handle = self.clone();

        let spawned = std::thread::Builder::new()
            .name("affect-loader".into())
            .spawn(move || match load_models(&detector_path, &classifier_path) {
                Ok(models) => {
                    handle.set_ready(models);
                    tracing::info!("models ready");
                }
                Err(err) => {
                    tracing::error!(error = %err, "model loading failed; predictions will be rejected");
                    handle.set_state(ModelState::Failed(err.to_string()));
                }
            });

        if let Err(err) = spawned {
            self.set_state(ModelState::Failed(err.to_string()));
            return Err(err.into());
        }
        Ok(())
    }

    /// Decode one data-url image and classify every face in it.
    ///
    /// Runs on the blocking pool, bounded by the configured timeout. A timed
    /// out call keeps running to completion in the background but its result
    /// is discarded.
    pub async fn predict(&self, image: String, request_id: String) -> Result<Vec<EmotionResult>, EngineError> {
        let models = self.models()?;
        let settings = self.settings.clone();
        let span = tracing::Span::current();

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<EmotionResult>, EngineError> {
            let _enter = span.enter();
            let frame = affect_core::decode_data_url(&image)?;

            if let Some(dir) = &settings.capture_dir {
                if let Err(err) = capture::save_frame(dir, &frame, &request_id) {
                    tracing::warn!(error = %err, "frame capture failed");
                }
            }

            Ok(models.infer(&frame, settings.threshold)?)
        });

        match tokio::time::timeout(self.settings.timeout, task).await {
            Err(_) => Err(EngineError::Timeout(self.settings.timeout)),
            Ok(Err(join)) => Err(EngineError::TaskFailed(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn load_models(detector_path: &str, classifier_path: &str) -> Result<SharedModels, EngineError> {
    let detector = FaceDetector::load(detector_path)?;
    tracing::info!(path = detector_path, "face detector loaded");

    let classifier = EmotionClassifier::load(classifier_path)?;
    tracing::info!(path = classifier_path, "emotion classifier loaded");

    Ok(SharedModels::new(detector, classifier))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use affect_core::{EmotionModel, FaceLocalizer};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use ndarray::ArrayView4;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Detector returning fixed candidates, optionally slow.
    pub struct FakeDetector {
        pub candidates: Vec<(f32, [f32; 4])>,
        pub delay: Duration,
        pub calls: Arc<AtomicUsize>,
    }

    impl FaceLocalizer for FakeDetector {
        fn forward(&mut self, _blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(self
                .candidates
                .iter()
                .flat_map(|(c, b)| [0.0, 1.0, *c, b[0], b[1], b[2], b[3]])
                .collect())
        }
    }

    /// Classifier that always answers "happy".
    pub struct FakeClassifier;

    impl EmotionModel for FakeClassifier {
        fn forward(&mut self, _input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
            Ok(vec![0.02, 0.02, 0.02, 0.88, 0.02, 0.02, 0.02])
        }
    }

    pub fn settings() -> EngineSettings {
        EngineSettings { threshold: 0.30, timeout: Duration::from_secs(5), capture_dir: None }
    }

    /// Ready engine with one face candidate at the given confidence.
    pub fn ready_engine(confidence: f32, settings: EngineSettings) -> (EngineHandle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = EngineHandle::new(settings);
        engine.set_ready(SharedModels::new(
            FakeDetector {
                candidates: vec![(confidence, [0.25, 0.25, 0.75, 0.75])],
                delay: Duration::ZERO,
                calls: calls.clone(),
            },
            FakeClassifier,
        ));
        (engine, calls)
    }

    /// Solid gray PNG as a data url.
    pub fn gray_data_url(width: u32, height: u32) -> String {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_uninitialized_reports_unavailable() {
        let engine = EngineHandle::new(settings());
        assert_eq!(engine.status(), "uninitialized");
        let err = engine.predict(gray_data_url(8, 8), "r".into()).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelsUnavailable(_)));
    }

    #[tokio::test]
    async fn test_loader_with_missing_artifacts_fails_without_panicking() {
        let engine = EngineHandle::new(settings());
        engine
            .spawn_loader("/nonexistent/det.onnx".into(), "/nonexistent/cls.onnx".into())
            .unwrap();

        for _ in 0..200 {
            if engine.status() == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.status(), "failed");

        let err = engine.predict(gray_data_url(8, 8), "r".into()).await.unwrap_err();
        match err {
            EngineError::ModelsUnavailable(msg) => assert!(msg.contains("model file not found"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_image_skips_models() {
        let (engine, calls) = ready_engine(0.95, settings());
        let err = engine
            .predict("data:image/jpeg;base64,!!!notbase64!!!".into(), "r".into())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode(DecodeError::Base64(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_face_above_threshold_is_classified() {
        let (engine, calls) = ready_engine(0.95, settings());
        let results = engine.predict(gray_data_url(224, 224), "r".into()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].emotion, affect_core::Emotion::Happy);
        assert_eq!(results[0].bbox, affect_core::BoundingBox::new(56, 56, 168, 168));
    }

    #[tokio::test]
    async fn test_threshold_boundary_yields_empty() {
        let (engine, _) = ready_engine(0.30, settings());
        let results = engine.predict(gray_data_url(64, 64), "r".into()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_slow_inference_times_out() {
        let engine = EngineHandle::new(EngineSettings { timeout: Duration::from_millis(20), ..settings() });
        engine.set_ready(SharedModels::new(
            FakeDetector {
                candidates: vec![],
                delay: Duration::from_millis(500),
                calls: Arc::new(AtomicUsize::new(0)),
            },
            FakeClassifier,
        ));
        let err = engine.predict(gray_data_url(8, 8), "r".into()).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_capture_dir_receives_frame() {
        let dir = std::env::temp_dir().join(format!("affectd-engine-{}", uuid::Uuid::new_v4()));
        let (engine, _) = ready_engine(0.95, EngineSettings { capture_dir: Some(dir.clone()), ..settings() });
        engine.predict(gray_data_url(32, 32), "abc".into()).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
