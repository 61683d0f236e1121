//! Aspect-ratio-aware resizing to a target size.
//!
//! Three modes, selected by [`ResizeOptions`]:
//!
//! - keep aspect ratio, allow cropping: scale to cover the target, then
//!   center-crop to the exact target size
//! - keep aspect ratio, no cropping: scale to fit inside the target (the
//!   result may be smaller than the target on one axis)
//! - ignore aspect ratio: stretch to the exact target size

use std::fmt;

use image::imageops;
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RgbaImage};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    #[default]
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> imageops::FilterType {
        match self {
            Self::Nearest => imageops::FilterType::Nearest,
            Self::Triangle => imageops::FilterType::Triangle,
            Self::CatmullRom => imageops::FilterType::CatmullRom,
            Self::Gaussian => imageops::FilterType::Gaussian,
            Self::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// How [`resize_to_fit`] treats the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
    /// Keep the source aspect ratio.
    pub maintain_aspect_ratio: bool,
    /// When keeping the aspect ratio, cover the target and crop the
    /// overflow instead of fitting inside it.
    pub allow_cropping: bool,
    /// Resampling filter.
    pub filter: ResizeFilter,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            maintain_aspect_ratio: true,
            allow_cropping: true,
            filter: ResizeFilter::default(),
        }
    }
}

/// Resize an image towards `target_width` x `target_height`.
///
/// Scaled sizes are rounded to the nearest pixel and never drop below 1.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDimensions`] if either target side is
/// zero.
pub fn resize_to_fit(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    options: ResizeOptions,
) -> Result<RgbaImage, PipelineError> {
    if target_width == 0 || target_height == 0 {
        return Err(PipelineError::InvalidDimensions {
            width: target_width,
            height: target_height,
        });
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        });
    }

    let filter = options.filter.to_image_filter();

    if !options.maintain_aspect_ratio {
        return Ok(imageops::resize(image, target_width, target_height, filter));
    }

    let width_ratio = f64::from(target_width) / f64::from(image.width());
    let height_ratio = f64::from(target_height) / f64::from(image.height());

    if !options.allow_cropping {
        let ratio = width_ratio.min(height_ratio);
        let (w, h) = scaled_size(image, ratio);
        return Ok(imageops::resize(image, w, h, filter));
    }

    let ratio = width_ratio.max(height_ratio);
    let (scaled_width, scaled_height) = scaled_size(image, ratio);
    let scaled = imageops::resize(image, scaled_width, scaled_height, filter);

    // Center the crop window, clamped inside the scaled image.
    let x = scaled_width.saturating_sub(target_width) / 2;
    let y = scaled_height.saturating_sub(target_height) / 2;
    let actual_width = target_width.min(scaled_width - x);
    let actual_height = target_height.min(scaled_height - y);

    if actual_width == 0 || actual_height == 0 {
        return Ok(imageops::resize(image, target_width, target_height, filter));
    }

    let cropped = imageops::crop_imm(&scaled, x, y, actual_width, actual_height).to_image();
    if actual_width == target_width && actual_height == target_height {
        Ok(cropped)
    } else {
        Ok(imageops::resize(&cropped, target_width, target_height, filter))
    }
}

/// Source size multiplied by `ratio`, rounded, at least 1x1.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_size(image: &RgbaImage, ratio: f64) -> (u32, u32) {
    let w = (f64::from(image.width()) * ratio).round().max(1.0) as u32;
    let h = (f64::from(image.height()) * ratio).round().max(1.0) as u32;
    (w, h)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Top half red, bottom half blue.
    fn split_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |_, y| {
            if y < h / 2 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn default_filter_is_catmull_rom() {
        assert_eq!(ResizeFilter::default(), ResizeFilter::CatmullRom);
    }

    #[test]
    fn zero_target_is_rejected() {
        let img = split_image(10, 10);
        let result = resize_to_fit(&img, 0, 5, ResizeOptions::default());
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDimensions {
                width: 0,
                height: 5
            })
        ));
    }

    #[test]
    fn cover_and_crop_produces_exact_target() {
        // 100x200 -> 50x50: scale by 0.5 to 50x100, crop 25 rows top and bottom.
        let img = split_image(100, 200);
        let result = resize_to_fit(&img, 50, 50, ResizeOptions::default()).unwrap();
        assert_eq!(result.dimensions(), (50, 50));

        // Visible window is the middle band: red top, blue bottom, and
        // the boundary stays in the middle (no vertical squash).
        for y in [2, 20] {
            let p = result.get_pixel(25, y).0;
            assert!(p[0] > 250 && p[2] < 5, "expected red at row {y}, got {p:?}");
        }
        for y in [30, 47] {
            let p = result.get_pixel(25, y).0;
            assert!(p[0] < 5 && p[2] > 250, "expected blue at row {y}, got {p:?}");
        }
    }

    #[test]
    fn fit_without_crop_keeps_aspect_ratio() {
        let img = split_image(100, 200);
        let options = ResizeOptions {
            allow_cropping: false,
            ..ResizeOptions::default()
        };
        let result = resize_to_fit(&img, 50, 50, options).unwrap();
        assert_eq!(result.dimensions(), (25, 50));
    }

    #[test]
    fn stretch_ignores_aspect_ratio() {
        let img = split_image(100, 200);
        let options = ResizeOptions {
            maintain_aspect_ratio: false,
            ..ResizeOptions::default()
        };
        let result = resize_to_fit(&img, 80, 30, options).unwrap();
        assert_eq!(result.dimensions(), (80, 30));
    }

    #[test]
    fn upscale_cover_and_crop() {
        let img = split_image(10, 20);
        let result = resize_to_fit(&img, 40, 40, ResizeOptions::default()).unwrap();
        assert_eq!(result.dimensions(), (40, 40));
    }

    #[test]
    fn tiny_ratio_never_collapses_to_zero() {
        let img = split_image(1000, 2);
        let options = ResizeOptions {
            allow_cropping: false,
            filter: ResizeFilter::Nearest,
            ..ResizeOptions::default()
        };
        let result = resize_to_fit(&img, 10, 10, options).unwrap();
        assert_eq!(result.dimensions(), (10, 1));
    }

    #[test]
    fn filter_display() {
        assert_eq!(ResizeFilter::Lanczos3.to_string(), "Lanczos3");
    }
}
