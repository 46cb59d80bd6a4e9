use affect_core::summary::{strongest, SessionSummary};
use affect_core::{EmotionClassifier, EmotionResult, FaceDetector, EMOTION_LABELS};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "affect", about = "Affect emotion inference CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run face and emotion inference on local images (bypasses the daemon)
    Predict {
        /// Image files to classify
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Detector confidence threshold (exclusive)
        #[arg(long, default_value_t = affect_core::DEFAULT_CONFIDENCE_THRESHOLD)]
        threshold: f32,
        /// Treat each file as a text file holding a base64 data url
        #[arg(long)]
        data_url: bool,
        /// Print the strongest face per file and a summary across all files
        #[arg(long)]
        summary: bool,
    },
    /// Print the emotion label table in classifier index order
    Labels,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict { files, model_dir, threshold, data_url, summary } => {
            let model_dir = model_dir.unwrap_or_else(affect_core::default_model_dir);
            predict(&files, &model_dir, threshold, data_url, summary)?;
        }
        Commands::Labels => {
            for (i, label) in EMOTION_LABELS.iter().enumerate() {
                println!("{i}\t{label}");
            }
        }
    }

    Ok(())
}

fn predict(files: &[PathBuf], model_dir: &Path, threshold: f32, data_url: bool, summary: bool) -> Result<()> {
    let detector_path = model_dir.join(affect_core::DETECTOR_MODEL_FILE);
    let classifier_path = model_dir.join(affect_core::CLASSIFIER_MODEL_FILE);

    let mut detector = FaceDetector::load(&detector_path.to_string_lossy())
        .context("loading face detector")?;
    let mut classifier = EmotionClassifier::load(&classifier_path.to_string_lossy())
        .context("loading emotion classifier")?;

    let mut session: Vec<Vec<EmotionResult>> = Vec::with_capacity(files.len());

    for path in files {
        let frame = match read_frame(path, data_url) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping file");
                println!("{}", error_line(path, &err));
                continue;
            }
        };

        let results = match affect_core::run_inference(&frame, &mut detector, &mut classifier, threshold) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "inference failed, skipping file");
                println!("{}", error_line(path, &err));
                continue;
            }
        };

        let mut line = serde_json::json!({ "file": path.display().to_string(), "faces": &results });
        if summary {
            line["strongest"] = serde_json::to_value(strongest(&results))?;
        }
        println!("{line}");
        session.push(results);
    }

    if summary {
        let s = SessionSummary::from_frames(session.iter().map(Vec::as_slice));
        println!("{}", serde_json::to_string_pretty(&s)?);
    }

    Ok(())
}

fn error_line(path: &Path, err: &dyn std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "file": path.display().to_string(), "error": err.to_string() })
}

fn read_frame(path: &Path, data_url: bool) -> Result<affect_core::Frame> {
    let frame = if data_url {
        let text = std::fs::read_to_string(path)?;
        affect_core::decode_data_url(&text)?
    } else {
        let bytes = std::fs::read(path)?;
        affect_core::decode_image_bytes(&bytes)?
    };
    Ok(frame)
}
