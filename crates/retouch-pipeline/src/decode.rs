//! Image decoding and PNG encoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the RGBA
//! pixel buffer every operation works on. Every stored version is
//! re-encoded as PNG so transparency produced by background removal and
//! flood fill survives the round trip through storage.

use image::ImageEncoder;

use crate::types::{PipelineError, RgbaImage};

/// Decode raw image bytes into an RGBA buffer.
///
/// Supports whatever the `image` crate was built to decode (PNG, JPEG,
/// BMP, WebP). Images without an alpha channel become fully opaque.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA buffer as PNG bytes.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the PNG encoder rejects the
/// buffer.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::ImageEncode(e.to_string()))?;
    Ok(buf)
}
