//! Frame → faces → emotions orchestration.

use crate::classifier::{self, ClassifierError, EmotionModel};
use crate::detector::{self, DetectorError, FaceLocalizer};
use crate::types::{EmotionResult, Frame};
use ndarray::ArrayView4;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("emotion classification failed for every face: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Run the detector once over `frame`, then classify each surviving face.
///
/// Faces are classified sequentially in detection order. A face whose crop is
/// empty or whose classification fails is skipped. The call fails on a
/// detector error, or when classification errored and no face succeeded.
pub fn run_inference<L, M>(
    frame: &Frame,
    localizer: &mut L,
    model: &mut M,
    threshold: f32,
) -> Result<Vec<EmotionResult>, PipelineError>
where
    L: FaceLocalizer + ?Sized,
    M: EmotionModel + ?Sized,
{
    let detections = detector::locate_faces(localizer, frame, threshold)?;

    let mut results = Vec::with_capacity(detections.len());
    let mut first_error = None;
    for (idx, det) in detections.iter().enumerate() {
        match classifier::classify_face(model, frame, det) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => tracing::debug!(idx, bbox = ?det.bbox, "empty face crop, skipping"),
            Err(err) => {
                tracing::warn!(idx, bbox = ?det.bbox, error = %err, "face classification failed, skipping");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if results.is_empty() {
        if let Some(err) = first_error {
            return Err(PipelineError::Classifier(err));
        }
    }

    tracing::debug!(
        width = frame.width,
        height = frame.height,
        faces = detections.len(),
        classified = results.len(),
        "inference complete"
    );

    Ok(results)
}

// A shared model is locked only for the duration of its own forward pass.
// Models hold no per-request state, so a lock poisoned by a panicking pass
// is recovered rather than failing every later request.
impl<T: FaceLocalizer + ?Sized> FaceLocalizer for &Mutex<T> {
    fn forward(&mut self, blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError> {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.forward(blob)
    }
}

impl<T: EmotionModel + ?Sized> EmotionModel for &Mutex<T> {
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
        let mut guard = self.lock().unwrap_or_else(|e| e.into_inner());
        guard.forward(input)
    }
}

/// Both loaded models, shareable across request threads.
///
/// Each model has its own lock, so one request can classify while another
/// runs detection.
pub struct SharedModels {
    detector: Mutex<Box<dyn FaceLocalizer + Send>>,
    classifier: Mutex<Box<dyn EmotionModel + Send>>,
}

impl SharedModels {
    pub fn new<L, M>(detector: L, classifier: M) -> Self
    where
        L: FaceLocalizer + Send + 'static,
        M: EmotionModel + Send + 'static,
    {
        Self {
            detector: Mutex::new(Box::new(detector)),
            classifier: Mutex::new(Box::new(classifier)),
        }
    }

    /// [`run_inference`] against the shared models.
    pub fn infer(&self, frame: &Frame, threshold: f32) -> Result<Vec<EmotionResult>, PipelineError> {
        let mut detector = &self.detector;
        let mut classifier = &self.classifier;
        run_inference(frame, &mut detector, &mut classifier, threshold)
    }
}
