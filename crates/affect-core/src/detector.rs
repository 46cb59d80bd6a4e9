//! res10 SSD face localizer via ONNX Runtime.
//!
//! Single-shot detector: one forward pass over a 224×224 mean-subtracted BGR
//! blob yields a `[1, 1, N, 7]` tensor of candidate boxes in normalized
//! coordinates.

use crate::imgproc;
use crate::types::{BoundingBox, Detection, Frame};
use ndarray::{Array4, ArrayView4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Intrinsic to the pretrained detector; do not alter ---
pub const DETECTOR_INPUT_SIZE: usize = 224;
/// Per-channel mean in B, G, R order.
pub const DETECTOR_MEAN: [f32; 3] = [104.0, 177.0, 123.0];
/// Exclusive: a candidate is kept only if `confidence > threshold`.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.30;
/// Values per candidate: [image_id, label, confidence, x_min, y_min, x_max, y_max].
const DETECTION_STRIDE: usize = 7;
const CONFIDENCE_OFFSET: usize = 2;
const BOX_OFFSET: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — place the face detector in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One forward pass of a face detection network.
///
/// Takes a `[1, 3, 224, 224]` blob and returns the flat `[1, 1, N, 7]` output.
pub trait FaceLocalizer {
    fn forward(&mut self, blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError>;
}

impl<T: FaceLocalizer + ?Sized> FaceLocalizer for Box<T> {
    fn forward(&mut self, blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError> {
        (**self).forward(blob)
    }
}

/// ONNX Runtime session for the res10 SSD face detector.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the detector ONNX graph from the given path.
    ///
    /// External weight files referenced by the graph are resolved relative to
    /// the graph's directory.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face detector model"
        );

        Ok(Self { session })
    }
}

impl FaceLocalizer for FaceDetector {
    fn forward(&mut self, blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(blob)?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detections: {e}")))?;

        Ok(raw.to_vec())
    }
}

/// Build the detector's NCHW input blob from a BGR frame.
///
/// Resizes to 224×224 (no letterbox, aspect ratio is not preserved), keeps
/// BGR channel order, subtracts [`DETECTOR_MEAN`], scale 1.0.
pub fn preprocess(frame: &Frame) -> Array4<f32> {
    let size = DETECTOR_INPUT_SIZE;
    let resized = imgproc::resize_bilinear(
        &frame.data,
        frame.width as usize,
        frame.height as usize,
        Frame::CHANNELS,
        size,
        size,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let off = (y * size + x) * Frame::CHANNELS;
            for (c, mean) in DETECTOR_MEAN.iter().enumerate() {
                tensor[[0, c, y, x]] = resized[off + c] as f32 - mean;
            }
        }
    }

    tensor
}

/// Turn raw detector output into pixel-space detections.
///
/// Keeps candidates with `confidence > threshold`, scales the normalized box
/// by the frame size, truncates toward zero, clamps to the frame and drops
/// zero-area boxes. Output preserves network order.
pub fn decode_detections(
    raw: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<Vec<Detection>, DetectorError> {
    if raw.len() % DETECTION_STRIDE != 0 {
        return Err(DetectorError::InferenceFailed(format!(
            "detector output length {} is not a multiple of {DETECTION_STRIDE}",
            raw.len()
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let mut detections = Vec::new();

    for (idx, candidate) in raw.chunks_exact(DETECTION_STRIDE).enumerate() {
        let confidence = candidate[CONFIDENCE_OFFSET];
        if confidence.is_nan() || confidence <= threshold {
            continue;
        }

        let b = &candidate[BOX_OFFSET..BOX_OFFSET + 4];
        let bbox = BoundingBox::new(
            (b[0] * w) as i32,
            (b[1] * h) as i32,
            (b[2] * w) as i32,
            (b[3] * h) as i32,
        )
        .clamped(width, height);

        if bbox.is_degenerate() {
            tracing::debug!(idx, confidence, ?bbox, "dropping degenerate detection");
            continue;
        }

        detections.push(Detection { bbox, confidence });
    }

    Ok(detections)
}

/// Run the localizer once over the whole frame.
pub fn locate_faces<L: FaceLocalizer + ?Sized>(
    localizer: &mut L,
    frame: &Frame,
    threshold: f32,
) -> Result<Vec<Detection>, DetectorError> {
    let blob = preprocess(frame);
    let raw = localizer.forward(blob.view())?;
    let detections = decode_detections(&raw, frame.width, frame.height, threshold)?;
    tracing::debug!(
        candidates = raw.len() / DETECTION_STRIDE,
        kept = detections.len(),
        "face localization"
    );
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(conf: f32, b: [f32; 4]) -> [f32; 7] {
        [0.0, 1.0, conf, b[0], b[1], b[2], b[3]]
    }

    fn raw(cands: &[[f32; 7]]) -> Vec<f32> {
        cands.iter().flatten().copied().collect()
    }

    #[test]
    fn test_preprocess_output_shape() {
        let frame = Frame::from_bgr(vec![0; 64 * 48 * 3], 64, 48).unwrap();
        let blob = preprocess(&frame);
        assert_eq!(blob.shape(), &[1, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_mean_subtraction_per_channel() {
        // A frame filled with exactly the mean normalizes to zero everywhere.
        let data = [104u8, 177, 123].iter().copied().cycle().take(50 * 40 * 3).collect();
        let frame = Frame::from_bgr(data, 50, 40).unwrap();
        let blob = preprocess(&frame);
        assert!(blob.iter().all(|&v| v.abs() < 1e-6));

        // Channel 0 is blue.
        let data = [200u8, 0, 0].iter().copied().cycle().take(10 * 10 * 3).collect();
        let frame = Frame::from_bgr(data, 10, 10).unwrap();
        let blob = preprocess(&frame);
        assert!((blob[[0, 0, 5, 5]] - 96.0).abs() < 1e-6);
        assert!((blob[[0, 1, 5, 5]] + 177.0).abs() < 1e-6);
        assert!((blob[[0, 2, 5, 5]] + 123.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let out = raw(&[
            candidate(0.30, [0.1, 0.1, 0.5, 0.5]),
            candidate(0.3001, [0.1, 0.1, 0.5, 0.5]),
            candidate(0.29, [0.1, 0.1, 0.5, 0.5]),
        ]);
        let dets = decode_detections(&out, 100, 100, DEFAULT_CONFIDENCE_THRESHOLD).unwrap();
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.3001).abs() < 1e-6);
    }

    #[test]
    fn test_boxes_scaled_by_frame_size() {
        let out = raw(&[candidate(0.9, [0.25, 0.5, 0.75, 1.0])]);
        let dets = decode_detections(&out, 200, 100, 0.3).unwrap();
        assert_eq!(dets[0].bbox, BoundingBox::new(50, 50, 150, 100));
    }

    #[test]
    fn test_boxes_clamped_to_frame() {
        let out = raw(&[candidate(0.9, [-0.2, -0.1, 1.3, 1.5])]);
        let dets = decode_detections(&out, 320, 240, 0.3).unwrap();
        assert_eq!(dets[0].bbox, BoundingBox::new(0, 0, 320, 240));
    }

    #[test]
    fn test_degenerate_boxes_dropped() {
        let out = raw(&[
            candidate(0.9, [0.5, 0.5, 0.5, 0.8]),   // zero width
            candidate(0.9, [1.2, 0.1, 1.5, 0.3]),   // entirely outside
            candidate(0.9, [0.6, 0.6, 0.4, 0.8]),   // inverted
            candidate(0.9, [0.1, 0.1, 0.2, 0.2]),   // valid
        ]);
        let dets = decode_detections(&out, 100, 100, 0.3).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(10, 10, 20, 20));
    }

    #[test]
    fn test_preserves_network_order() {
        let out = raw(&[
            candidate(0.5, [0.0, 0.0, 0.1, 0.1]),
            candidate(0.99, [0.5, 0.5, 0.6, 0.6]),
            candidate(0.7, [0.2, 0.2, 0.3, 0.3]),
        ]);
        let dets = decode_detections(&out, 100, 100, 0.3).unwrap();
        let confs: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.5, 0.99, 0.7]);
    }

    #[test]
    fn test_nan_confidence_rejected() {
        let out = raw(&[candidate(f32::NAN, [0.1, 0.1, 0.5, 0.5])]);
        assert!(decode_detections(&out, 100, 100, 0.3).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_output_length() {
        let err = decode_detections(&[0.0; 13], 100, 100, 0.3).unwrap_err();
        assert!(matches!(err, DetectorError::InferenceFailed(_)));
    }

    #[test]
    fn test_locate_faces_passes_blob_to_localizer() {
        struct Probe;
        impl FaceLocalizer for Probe {
            fn forward(&mut self, blob: ArrayView4<'_, f32>) -> Result<Vec<f32>, DetectorError> {
                assert_eq!(blob.shape(), &[1, 3, 224, 224]);
                Ok(candidate(0.95, [0.25, 0.25, 0.75, 0.75]).to_vec())
            }
        }

        let frame = Frame::from_bgr(vec![90; 224 * 224 * 3], 224, 224).unwrap();
        let dets = locate_faces(&mut Probe, &frame, 0.3).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(56, 56, 168, 168));
    }
}
