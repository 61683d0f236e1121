//! Gaussian blur for mask feathering and cartoon smoothing.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`]. [`gaussian_blur`]
//! softens a single-channel mask; [`gaussian_blur_rgba`] applies the same
//! blur independently to each R/G/B/A channel of a color image.

use image::GrayImage;

use crate::types::RgbaImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Apply Gaussian blur to an RGBA image one channel at a time.
///
/// Non-positive sigma values return the image unchanged.
#[must_use = "returns the blurred RGBA image"]
pub fn gaussian_blur_rgba(image: &RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();

    let blurred: [GrayImage; 4] = std::array::from_fn(|c| {
        let channel = GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]));
        imageproc::filter::gaussian_blur_f32(&channel, sigma)
    });

    RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba(std::array::from_fn(|c| blurred[c].get_pixel(x, y).0[0]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hard-edged square mask: 255 inside, 0 outside.
    fn square_mask() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            if (5..15).contains(&x) && (5..15).contains(&y) {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        })
    }

    #[test]
    fn zero_sigma_is_identity() {
        let img = square_mask();
        assert_eq!(gaussian_blur(&img, 0.0), img);
    }

    #[test]
    fn blur_softens_mask_edges() {
        let blurred = gaussian_blur(&square_mask(), 2.0);
        let edge = blurred.get_pixel(5, 10).0[0];
        assert!(edge > 0 && edge < 255, "edge should be partial, got {edge}");
        assert!(blurred.get_pixel(10, 10).0[0] > 200);
        assert!(blurred.get_pixel(0, 0).0[0] < 20);
    }

    #[test]
    fn rgba_blur_of_uniform_image_is_unchanged() {
        let img = RgbaImage::from_pixel(8, 8, image::Rgba([40, 80, 120, 255]));
        let blurred = gaussian_blur_rgba(&img, 1.5);
        for p in blurred.pixels() {
            for (got, want) in p.0.iter().zip([40u8, 80, 120, 255]) {
                assert!(got.abs_diff(want) <= 1, "got {:?}", p.0);
            }
        }
    }

    #[test]
    fn empty_image_is_returned_as_is() {
        let img = GrayImage::new(0, 0);
        assert_eq!(gaussian_blur(&img, 2.0).dimensions(), (0, 0));
    }
}
