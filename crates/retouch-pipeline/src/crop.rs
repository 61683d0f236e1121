//! Rectangular crop.

use image::imageops;

use crate::types::{CropRect, Dimensions, PipelineError, RgbaImage};

/// Copy the region described by `rect` out of `image`.
///
/// The rectangle is validated against the image before any pixel is
/// copied.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidCropRectangle`] if the rectangle is
/// empty or leaves the image.
pub fn crop(image: &RgbaImage, rect: CropRect) -> Result<RgbaImage, PipelineError> {
    rect.validate(Dimensions::of(image))?;
    Ok(imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        #[allow(clippy::cast_possible_truncation)]
        RgbaImage::from_fn(w, h, |x, y| image::Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn crop_copies_the_requested_region() {
        let img = gradient(20, 10);
        let out = crop(&img, CropRect::new(5, 2, 4, 3)).unwrap();
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.get_pixel(0, 0).0, [5, 2, 0, 255]);
        assert_eq!(out.get_pixel(3, 2).0, [8, 4, 0, 255]);
    }

    #[test]
    fn out_of_bounds_crop_is_rejected() {
        let img = gradient(20, 10);
        let result = crop(&img, CropRect::new(15, 0, 10, 5));
        assert!(matches!(
            result,
            Err(PipelineError::InvalidCropRectangle {
                source_width: 20,
                source_height: 10,
                ..
            })
        ));
    }
}
