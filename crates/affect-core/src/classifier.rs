//! Seven-way facial emotion classifier via ONNX Runtime.
//!
//! Consumes a 48×48 single-channel face crop in NHWC layout and returns a
//! softmax vector indexed by [`EMOTION_LABELS`](crate::types::EMOTION_LABELS).

use crate::imgproc;
use crate::types::{BoundingBox, Detection, Emotion, EmotionResult, Frame};
use ndarray::{Array4, ArrayView4};
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub const CLASSIFIER_INPUT_SIZE: usize = 48;
pub const CLASSIFIER_CLASSES: usize = 7;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — place the emotion classifier in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {CLASSIFIER_CLASSES} class probabilities, got {0}")]
    UnexpectedOutput(usize),
    #[error("classifier produced a non-finite probability")]
    NonFinite,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One forward pass of an emotion classification network.
///
/// Takes a `[1, 48, 48, 1]` batch and returns the class probability vector.
pub trait EmotionModel {
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError>;
}

impl<T: EmotionModel + ?Sized> EmotionModel for Box<T> {
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
        (**self).forward(input)
    }
}

/// ONNX Runtime session for the emotion classifier.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Load the classifier ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion classifier model"
        );

        Ok(Self { session })
    }
}

impl EmotionModel for EmotionClassifier {
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input)?])?;

        let (_, probs) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("probabilities: {e}")))?;

        Ok(probs.to_vec())
    }
}

/// Crop, convert to luma, resize to 48×48 and lay out as `[1, 48, 48, 1]`.
///
/// Pixel values stay in raw 0–255 range: the classifier was trained without
/// rescaling. Returns `None` if the crop is empty.
pub fn preprocess(frame: &Frame, bbox: &BoundingBox) -> Option<Array4<f32>> {
    let face = imgproc::crop(frame, bbox)?;
    let gray = imgproc::bgr_to_gray(&face);

    let size = CLASSIFIER_INPUT_SIZE;
    let resized = imgproc::resize_bilinear(
        &gray,
        face.width as usize,
        face.height as usize,
        1,
        size,
        size,
    );

    let mut tensor = Array4::<f32>::zeros((1, size, size, 1));
    for y in 0..size {
        for x in 0..size {
            tensor[[0, y, x, 0]] = resized[y * size + x] as f32;
        }
    }
    Some(tensor)
}

/// Build an [`EmotionResult`] from a probability vector.
///
/// The predicted label is the first maximum, matching `argmax` semantics.
pub fn interpret(bbox: BoundingBox, probs: &[f32]) -> Result<EmotionResult, ClassifierError> {
    if probs.len() != CLASSIFIER_CLASSES {
        return Err(ClassifierError::UnexpectedOutput(probs.len()));
    }
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(ClassifierError::NonFinite);
    }

    let mut best = 0;
    for (i, &p) in probs.iter().enumerate().skip(1) {
        if p > probs[best] {
            best = i;
        }
    }

    let all_predictions: BTreeMap<Emotion, f32> =
        Emotion::ALL.iter().copied().zip(probs.iter().copied()).collect();

    Ok(EmotionResult {
        bbox,
        emotion: Emotion::ALL[best],
        confidence: probs[best],
        all_predictions,
    })
}

/// Classify one detected face. `Ok(None)` means the crop was empty.
pub fn classify_face<M: EmotionModel + ?Sized>(
    model: &mut M,
    frame: &Frame,
    detection: &Detection,
) -> Result<Option<EmotionResult>, ClassifierError> {
    let Some(input) = preprocess(frame, &detection.bbox) else {
        return Ok(None);
    };
    let probs = model.forward(input.view())?;
    interpret(detection.bbox, &probs).map(Some)
}
