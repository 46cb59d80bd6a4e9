use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Emotion labels in classifier output order.
///
/// Index `i` of the classifier's softmax vector is `EMOTION_LABELS[i]`. Any
/// replacement model artifact must ship with this exact ordering.
pub const EMOTION_LABELS: [&str; 7] = [
    "angry", "disgust", "fear", "happy", "neutral", "sad", "surprise",
];

/// One of the seven emotion categories, declared in classifier index order.
///
/// `Ord` follows declaration order, so maps keyed by `Emotion` iterate in
/// output-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    /// All labels, index-aligned with [`EMOTION_LABELS`].
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    /// Map a classifier output index to its label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        EMOTION_LABELS[self.index()]
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded color image, BGR-interleaved, row-major, one byte per channel.
///
/// Channel order is BGR because the detector's mean constants are given in
/// B, G, R order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap a BGR buffer. Returns `None` if either dimension is zero or the
    /// buffer length does not match `width * height * 3`.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if data.len() != width as usize * height as usize * Self::CHANNELS {
            return None;
        }
        Some(Self { data, width, height })
    }

    /// Convert an RGB raster into a BGR frame.
    pub fn from_rgb_image(img: &image::RgbImage) -> Option<Self> {
        let mut data = img.as_raw().clone();
        for px in data.chunks_exact_mut(Self::CHANNELS) {
            px.swap(0, 2);
        }
        Self::from_bgr(data, img.width(), img.height())
    }

    /// Convert back to an RGB raster for encoding.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(Self::CHANNELS) {
            px.swap(0, 2);
        }
        // Length invariant is checked at construction.
        image::RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }

    /// BGR triple at (x, y). Caller guarantees bounds.
    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let off = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.data[off], self.data[off + 1], self.data[off + 2]]
    }
}

/// Axis-aligned face box in integer pixel coordinates.
///
/// Serialised as `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }

    /// Zero or negative area.
    pub fn is_degenerate(&self) -> bool {
        self.x_min >= self.x_max || self.y_min >= self.y_max
    }

    /// Clamp all four coordinates to `[0, width] x [0, height]`.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let w = width.min(i32::MAX as u32) as i32;
        let h = height.min(i32::MAX as u32) as i32;
        Self {
            x_min: self.x_min.clamp(0, w),
            y_min: self.y_min.clamp(0, h),
            x_max: self.x_max.clamp(0, w),
            y_max: self.y_max.clamp(0, h),
        }
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x_min, b.y_min, b.x_max, b.y_max]
    }
}

/// A candidate face region that survived thresholding and clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

/// Classification of one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub emotion: Emotion,
    /// Softmax value at the arg-max index.
    pub confidence: f32,
    /// Full distribution, all seven labels.
    pub all_predictions: BTreeMap<Emotion, f32>,
}
