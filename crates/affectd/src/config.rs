use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0:5000).
    pub listen_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detector graph file name inside `model_dir`.
    pub detector_model: String,
    /// Classifier file name inside `model_dir`.
    pub classifier_model: String,
    /// Detector confidence threshold (exclusive). Fixed for the process lifetime.
    pub detection_threshold: f32,
    /// Upper bound on one inference call.
    pub inference_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// When set, every decoded frame is written here as JPEG.
    pub capture_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `AFFECT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = get("AFFECT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(affect_core::default_model_dir);

        Self {
            listen_addr: get("AFFECT_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            model_dir,
            detector_model: get("AFFECT_DETECTOR_MODEL")
                .unwrap_or_else(|| affect_core::DETECTOR_MODEL_FILE.to_string()),
            classifier_model: get("AFFECT_CLASSIFIER_MODEL")
                .unwrap_or_else(|| affect_core::CLASSIFIER_MODEL_FILE.to_string()),
            detection_threshold: parse_or(
                &get,
                "AFFECT_DETECTION_THRESHOLD",
                affect_core::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            inference_timeout: Duration::from_secs(parse_or(&get, "AFFECT_INFERENCE_TIMEOUT_SECS", 10)),
            max_body_bytes: parse_or(&get, "AFFECT_MAX_BODY_BYTES", 16 * 1024 * 1024),
            capture_dir: get("AFFECT_CAPTURE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Path to the face detector model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the emotion classifier model.
    pub fn classifier_model_path(&self) -> String {
        self.model_dir
            .join(&self.classifier_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
