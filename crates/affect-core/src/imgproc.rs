//! Raster helpers shared by the detector and the classifier.

use crate::types::{BoundingBox, Frame};

// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Resize an interleaved `channels`-per-pixel buffer with bilinear
/// interpolation, sampling at pixel centres.
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; new_w * new_h * channels];
    if width == 0 || height == 0 || src.len() < width * height * channels {
        return out;
    }

    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..channels {
                let tl = src[(y0 * width + x0) * channels + c] as f32;
                let tr = src[(y0 * width + x1) * channels + c] as f32;
                let bl = src[(y1 * width + x0) * channels + c] as f32;
                let br = src[(y1 * width + x1) * channels + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                out[(y * new_w + x) * channels + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Copy the region under `bbox` (clamped to the frame) into a new frame.
///
/// Returns `None` when the clamped box has zero area.
pub fn crop(frame: &Frame, bbox: &BoundingBox) -> Option<Frame> {
    let b = bbox.clamped(frame.width, frame.height);
    if b.is_degenerate() {
        return None;
    }

    let (x0, y0) = (b.x_min as usize, b.y_min as usize);
    let (w, h) = (b.width() as usize, b.height() as usize);
    let stride = frame.width as usize * Frame::CHANNELS;

    let mut data = Vec::with_capacity(w * h * Frame::CHANNELS);
    for y in y0..y0 + h {
        let start = y * stride + x0 * Frame::CHANNELS;
        data.extend_from_slice(&frame.data[start..start + w * Frame::CHANNELS]);
    }

    Frame::from_bgr(data, w as u32, h as u32)
}

/// BGR → single-channel luma.
pub fn bgr_to_gray(frame: &Frame) -> Vec<u8> {
    frame
        .data
        .chunks_exact(Frame::CHANNELS)
        .map(|px| {
            let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
            (LUMA_B * b + LUMA_G * g + LUMA_R * r).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
