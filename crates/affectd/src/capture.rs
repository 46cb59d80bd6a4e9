//! Debug persistence of received frames.

use affect_core::Frame;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("cannot create capture directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("cannot write frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Write `frame` as `frame_<unix-ms>_<request-id>.jpg` under `dir`.
pub fn save_frame(dir: &Path, frame: &Frame, request_id: &str) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(dir).map_err(|e| CaptureError::CreateDir(dir.to_path_buf(), e))?;

    let millis = chrono::Utc::now().timestamp_millis();
    let path = dir.join(format!("frame_{millis}_{request_id}.jpg"));
    frame
        .to_rgb_image()
        .save_with_format(&path, image::ImageFormat::Jpeg)?;

    tracing::debug!(path = %path.display(), "captured frame");
    Ok(path)
}
