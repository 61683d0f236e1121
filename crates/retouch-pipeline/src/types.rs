//! Shared types for the retouch pixel pipeline.

use serde::{Deserialize, Serialize};

use crate::resize::ResizeFilter;

/// Re-export `GrayImage` so downstream crates can reference masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage`, the pixel buffer every operation consumes
/// and produces.
pub use image::RgbaImage;

/// A 2D point in image coordinates (sub-pixel precision).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An integer pixel location used as a flood fill seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl Seed {
    /// Create a new seed.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing image.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// A crop rectangle in source-image pixel coordinates.
///
/// Stored on Crop versions so the edit can be traced back to the
/// region of the original that was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width of the kept region.
    pub width: u32,
    /// Height of the kept region.
    pub height: u32,
}

impl CropRect {
    /// Create a new crop rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check the rectangle against a source image of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCropRectangle`] if either side is
    /// zero or the rectangle extends past the source bounds.
    pub fn validate(self, source: Dimensions) -> Result<(), PipelineError> {
        let fits_x = self.x.checked_add(self.width).is_some_and(|r| r <= source.width);
        let fits_y = self.y.checked_add(self.height).is_some_and(|b| b <= source.height);
        if self.width == 0 || self.height == 0 || !fits_x || !fits_y {
            return Err(PipelineError::InvalidCropRectangle {
                rect: self,
                source_width: source.width,
                source_height: source.height,
            });
        }
        Ok(())
    }
}

/// Replacement for pixels classified as background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundFill {
    /// Opaque white.
    #[default]
    White,
    /// Opaque pure blue.
    Blue,
    /// Fully transparent.
    Transparent,
}

impl BackgroundFill {
    /// The RGBA value written for background pixels.
    #[must_use]
    pub const fn rgba(self) -> image::Rgba<u8> {
        match self {
            Self::White => image::Rgba([255, 255, 255, 255]),
            Self::Blue => image::Rgba([0, 0, 255, 255]),
            Self::Transparent => image::Rgba([255, 255, 255, 0]),
        }
    }

    /// Whether the fill hides what is underneath it.
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        !matches!(self, Self::Transparent)
    }
}

/// Tuning for the neighbor-similarity background classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Two colors are similar when every RGB channel differs by strictly
    /// less than this value.
    pub similarity_threshold: u8,

    /// A pixel with at least this many similar 8-neighbors is background.
    pub min_similar_neighbors: u8,
}

impl SegmentationConfig {
    /// Default per-channel similarity threshold.
    pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 2;
    /// Default similar-neighbor count for a background pixel.
    pub const DEFAULT_MIN_SIMILAR_NEIGHBORS: u8 = 3;
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
            min_similar_neighbors: Self::DEFAULT_MIN_SIMILAR_NEIGHBORS,
        }
    }
}

/// Tuning for the feathered overlay blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Gaussian sigma used to soften the quad mask edges.
    pub feather_sigma: f32,

    /// Combined alpha below which a pixel is left untouched.
    pub min_alpha: f32,
}

impl OverlayConfig {
    /// Default feather sigma.
    pub const DEFAULT_FEATHER_SIGMA: f32 = 2.0;
    /// Default minimum blend alpha.
    pub const DEFAULT_MIN_ALPHA: f32 = 0.05;
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            feather_sigma: Self::DEFAULT_FEATHER_SIGMA,
            min_alpha: Self::DEFAULT_MIN_ALPHA,
        }
    }
}

/// Tuning for the cartoon stylization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartoonConfig {
    /// Smoothing applied before posterization and edge detection.
    pub blur_sigma: f32,

    /// Number of tone levels kept per channel (at least 2).
    pub levels: u8,

    /// Canny low threshold for ink lines.
    pub edge_low: f32,

    /// Canny high threshold for ink lines.
    pub edge_high: f32,
}

impl CartoonConfig {
    /// Default blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.5;
    /// Default tone levels per channel.
    pub const DEFAULT_LEVELS: u8 = 6;
    /// Default Canny low threshold.
    pub const DEFAULT_EDGE_LOW: f32 = 40.0;
    /// Default Canny high threshold.
    pub const DEFAULT_EDGE_HIGH: f32 = 110.0;
}

impl Default for CartoonConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            levels: Self::DEFAULT_LEVELS,
            edge_low: Self::DEFAULT_EDGE_LOW,
            edge_high: Self::DEFAULT_EDGE_HIGH,
        }
    }
}

/// All pixel-operation tuning in one place.
///
/// Every field is defaulted so partial configuration files deserialize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Background classifier parameters.
    pub segmentation: SegmentationConfig,

    /// Which background classifier automatic removal uses.
    pub classifier: crate::segment::BackgroundClassifier,

    /// Overlay blend parameters.
    pub overlay: OverlayConfig,

    /// Cartoon stylization parameters.
    pub cartoon: CartoonConfig,

    /// Resampling filter for resize operations.
    pub resize_filter: ResizeFilter,
}

/// Errors that can occur in pixel operations.
///
/// Geometry errors are raised before any pixel work begins.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// The crop rectangle is empty or leaves the source image.
    #[error(
        "invalid crop rectangle {}x{} at ({}, {}) for {source_width}x{source_height} image",
        .rect.width, .rect.height, .rect.x, .rect.y
    )]
    InvalidCropRectangle {
        /// The rejected rectangle.
        rect: CropRect,
        /// Source image width.
        source_width: u32,
        /// Source image height.
        source_height: u32,
    },

    /// A target size has a zero side.
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A flood fill seed lies outside the image.
    #[error("seed ({}, {}) is outside the {width}x{height} image", .seed.x, .seed.y)]
    SeedOutOfBounds {
        /// The rejected seed.
        seed: Seed,
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },

    /// The overlay quadrilateral does not cover any pixel of the image.
    #[error("overlay quadrilateral does not intersect the image")]
    InvalidQuad,

    /// Operation parameters are invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SOURCE: Dimensions = Dimensions {
        width: 100,
        height: 80,
    };

    #[test]
    fn crop_rect_inside_is_valid() {
        assert!(CropRect::new(10, 10, 50, 40).validate(SOURCE).is_ok());
    }

    #[test]
    fn crop_rect_touching_edges_is_valid() {
        assert!(CropRect::new(0, 0, 100, 80).validate(SOURCE).is_ok());
    }

    #[test]
    fn crop_rect_zero_size_is_rejected() {
        let result = CropRect::new(10, 10, 0, 40).validate(SOURCE);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidCropRectangle { .. })
        ));
    }

    #[test]
    fn crop_rect_past_right_edge_is_rejected() {
        let result = CropRect::new(60, 0, 41, 10).validate(SOURCE);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidCropRectangle { .. })
        ));
    }

    #[test]
    fn crop_rect_overflowing_offset_is_rejected() {
        let result = CropRect::new(u32::MAX, 0, 2, 10).validate(SOURCE);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidCropRectangle { .. })
        ));
    }

    #[test]
    fn background_fill_colors() {
        assert_eq!(BackgroundFill::White.rgba().0, [255, 255, 255, 255]);
        assert_eq!(BackgroundFill::Blue.rgba().0, [0, 0, 255, 255]);
        assert_eq!(BackgroundFill::Transparent.rgba().0[3], 0);
        assert!(!BackgroundFill::Transparent.is_opaque());
    }

    #[test]
    fn edit_config_partial_json_uses_defaults() {
        let json = r#"{ "segmentation": { "similarity_threshold": 5 } }"#;
        let config: EditConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.segmentation.similarity_threshold, 5);
        assert_eq!(
            config.segmentation.min_similar_neighbors,
            SegmentationConfig::DEFAULT_MIN_SIMILAR_NEIGHBORS
        );
        assert_eq!(config.overlay, OverlayConfig::default());
    }

    #[test]
    fn error_message_names_rectangle() {
        let err = CropRect::new(1, 2, 3, 4)
            .validate(Dimensions {
                width: 2,
                height: 2,
            })
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("3x4 at (1, 2)"), "got {msg}");
    }
}
