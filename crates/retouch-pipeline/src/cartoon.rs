//! Cartoon stylization: smooth, posterize, ink the edges.
//!
//! 1. Gaussian blur on all four channels to flatten texture.
//! 2. Posterize each color channel to `levels` evenly spaced tones.
//! 3. Canny edges of the blurred luminance are painted as dark ink.
//!
//! Alpha passes through untouched, so a cutout stays a cutout.

use image::GrayImage;

use crate::blur::gaussian_blur_rgba;
use crate::types::{CartoonConfig, PipelineError, RgbaImage};

/// Minimum allowed Canny threshold.
///
/// A zero low threshold turns every gradient into ink.
pub const MIN_EDGE_THRESHOLD: f32 = 1.0;

/// Ink color for edge pixels.
const INK: [u8; 3] = [20, 20, 20];

/// Map `value` to the nearest of `levels` evenly spaced tones in 0..=255.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn posterize_channel(value: u8, levels: u8) -> u8 {
    let steps = f32::from(levels - 1);
    let step = (f32::from(value) / 255.0 * steps).round();
    (step / steps * 255.0).round() as u8
}

/// Posterize the color channels of `image`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `levels` is below 2.
pub fn posterize(image: &RgbaImage, levels: u8) -> Result<RgbaImage, PipelineError> {
    if levels < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "posterize needs at least 2 levels, got {levels}"
        )));
    }
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel.0[c] = posterize_channel(pixel.0[c], levels);
        }
    }
    Ok(out)
}

/// Detect ink lines with Canny on the luminance of `image`.
///
/// Thresholds are clamped to at least [`MIN_EDGE_THRESHOLD`] and the low
/// threshold never exceeds the high one.
#[must_use = "returns the edge map"]
pub fn ink_edges(image: &RgbaImage, low: f32, high: f32) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let high = high.max(MIN_EDGE_THRESHOLD);
    let low = low.max(MIN_EDGE_THRESHOLD).min(high);
    imageproc::edges::canny(&gray, low, high)
}

/// Cartoonise `image`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config.levels` is below 2.
pub fn cartoonise(image: &RgbaImage, config: &CartoonConfig) -> Result<RgbaImage, PipelineError> {
    let smoothed = gaussian_blur_rgba(image, config.blur_sigma);
    let mut out = posterize(&smoothed, config.levels)?;
    let edges = ink_edges(&smoothed, config.edge_low, config.edge_high);

    for ((pixel, edge), src) in out.pixels_mut().zip(edges.pixels()).zip(image.pixels()) {
        if edge.0[0] > 0 {
            pixel.0[..3].copy_from_slice(&INK);
        }
        pixel.0[3] = src.0[3];
    }
    Ok(out)
}
