//! affect-core — Face localisation and emotion classification engine.
//!
//! Uses a res10 SSD for face detection and a 48×48 grayscale CNN for
//! seven-way emotion classification, both running via ONNX Runtime for CPU
//! inference.

pub mod classifier;
pub mod decoder;
pub mod detector;
pub mod imgproc;
pub mod pipeline;
pub mod summary;
pub mod types;

pub use classifier::{EmotionClassifier, EmotionModel};
pub use decoder::{decode_data_url, decode_image_bytes, DecodeError};
pub use detector::{FaceDetector, FaceLocalizer, DEFAULT_CONFIDENCE_THRESHOLD};
pub use pipeline::{run_inference, PipelineError, SharedModels};
pub use summary::SessionSummary;
pub use types::{BoundingBox, Detection, Emotion, EmotionResult, Frame, EMOTION_LABELS};

use std::path::PathBuf;

/// File name of the face detector graph inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "res10_300x300_ssd.onnx";
/// File name of the emotion classifier inside the model directory.
pub const CLASSIFIER_MODEL_FILE: &str = "emotion_fer_48.onnx";

/// System-wide model directory if installed, otherwise `./models`.
pub fn default_model_dir() -> PathBuf {
    let system = PathBuf::from("/usr/share/affect/models");
    if system.is_dir() {
        system
    } else {
        PathBuf::from("models")
    }
}
