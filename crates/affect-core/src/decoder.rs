//! Transport decoding: base64 data URL → BGR [`Frame`].

use crate::types::Frame;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload has no data-url prefix (expected \"data:<mime>;base64,<data>\")")]
    MissingPayload,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("could not decode image: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("decoded image has zero width or height")]
    EmptyImage,
}

/// Decode a `data:<mime>;base64,<payload>` string into a BGR frame.
///
/// Only the part after the first comma is used; the mime type is ignored and
/// the image format is sniffed from the decoded bytes.
pub fn decode_data_url(input: &str) -> Result<Frame, DecodeError> {
    let (_, payload) = input.split_once(',').ok_or(DecodeError::MissingPayload)?;
    let bytes = STANDARD.decode(payload.trim())?;
    decode_image_bytes(&bytes)
}

/// Decode raw encoded image bytes (JPEG, PNG, ...) into a BGR frame.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    let frame = Frame::from_rgb_image(&img).ok_or(DecodeError::EmptyImage)?;
    tracing::debug!(width = frame.width, height = frame.height, "decoded frame");
    Ok(frame)
}
