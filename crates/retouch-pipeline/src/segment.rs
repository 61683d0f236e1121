//! Automatic background segmentation.
//!
//! Removal runs in three stages:
//!
//! 1. **Classification**: a [`BackgroundClassifier`] turns the RGBA
//!    source into a background mask (255 = background, 0 = subject).
//! 2. **Outline**: subject pixels touching background through any of
//!    their 8 neighbors form the outline. Anti-aliased halos live here.
//! 3. **Interior fill**: a 4-connected flood fill over subject pixels
//!    that are not outline pixels, seeded near the center of the outline
//!    bounding box, produces the subject mask.
//!
//! [`remove_background`] composites the original image through the
//! subject mask (DST_IN), so subject edge pixels keep their original
//! colors instead of being recolored by the fill.
//!
//! # Strategy pattern
//!
//! Classification is pluggable through the [`Classifier`] trait. The
//! [`BackgroundClassifier`] enum selects the algorithm at runtime from
//! configuration.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::composite::{apply_mask, flatten_onto};
use crate::types::{BackgroundFill, RgbaImage, SegmentationConfig};

/// Mask value for background (in a background mask) or subject (in a
/// subject mask).
pub const MASK_ON: u8 = 255;

/// Mask value for everything else.
pub const MASK_OFF: u8 = 0;

/// Offsets of the 8-connected neighborhood.
const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Offsets of the 4-connected neighborhood.
const NEIGHBORS_4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Selects which background classifier automatic removal uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundClassifier {
    /// A pixel is background when enough of its 8 neighbors share its
    /// color. Flat backdrops pass, textured subjects do not.
    #[default]
    NeighborSimilarity,

    /// A pixel is background when its luminance is above the Otsu
    /// threshold of the whole image. Suited to bright studio backdrops.
    LuminanceThreshold,
}

/// Trait for background classification strategies.
///
/// Output: a mask the size of the input, [`MASK_ON`] for background.
/// Each output pixel depends only on the input image, so rows may be
/// computed in any order.
pub trait Classifier {
    /// Classify every pixel of `image`.
    fn classify(&self, image: &RgbaImage, config: &SegmentationConfig) -> GrayImage;
}

impl Classifier for BackgroundClassifier {
    fn classify(&self, image: &RgbaImage, config: &SegmentationConfig) -> GrayImage {
        match *self {
            Self::NeighborSimilarity => classify_neighbor_similarity(image, config),
            Self::LuminanceThreshold => classify_luminance_threshold(image),
        }
    }
}

/// Whether every RGB channel of `a` and `b` differs by less than
/// `threshold`.
fn similar(a: image::Rgba<u8>, b: image::Rgba<u8>, threshold: u8) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .take(3)
        .all(|(&ca, &cb)| ca.abs_diff(cb) < threshold)
}

/// `(x, y) + (dx, dy)` if it lands inside a `width` x `height` grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn offset(x: u32, y: u32, (dx, dy): (i64, i64), width: u32, height: u32) -> Option<(u32, u32)> {
    let nx = i64::from(x) + dx;
    let ny = i64::from(y) + dy;
    if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
        return None;
    }
    Some((nx as u32, ny as u32))
}

/// Neighbor-similarity classification, one row per rayon task.
#[must_use = "returns the background mask"]
pub fn classify_neighbor_similarity(image: &RgbaImage, config: &SegmentationConfig) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut mask = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return mask;
    }

    mask.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(row, out)| {
            #[allow(clippy::cast_possible_truncation)]
            let y = row as u32;
            for (x, value) in (0..w).zip(out.iter_mut()) {
                let center = *image.get_pixel(x, y);
                let count = NEIGHBORS_8
                    .iter()
                    .filter_map(|&d| offset(x, y, d, w, h))
                    .filter(|&(nx, ny)| {
                        similar(center, *image.get_pixel(nx, ny), config.similarity_threshold)
                    })
                    .count();
                *value = if count >= usize::from(config.min_similar_neighbors) {
                    MASK_ON
                } else {
                    MASK_OFF
                };
            }
        });

    mask
}

/// Otsu luminance classification: brighter than the threshold is
/// background.
#[must_use = "returns the background mask"]
pub fn classify_luminance_threshold(image: &RgbaImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut mask = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return mask;
    }

    let gray = image::imageops::grayscale(image);
    let level = imageproc::contrast::otsu_level(&gray);

    mask.par_chunks_mut(w as usize)
        .zip(gray.par_chunks(w as usize))
        .for_each(|(out, luma)| {
            for (value, &l) in out.iter_mut().zip(luma) {
                *value = if l > level { MASK_ON } else { MASK_OFF };
            }
        });

    mask
}

/// Replace background pixels with `fill`, leaving the rest untouched.
///
/// This is the raw classifier output, before outline cleanup.
#[must_use = "returns the filled image"]
pub fn fill_background(image: &RgbaImage, background: &GrayImage, fill: BackgroundFill) -> RgbaImage {
    let mut out = image.clone();
    for (pixel, bg) in out.pixels_mut().zip(background.pixels()) {
        if bg.0[0] == MASK_ON {
            *pixel = fill.rgba();
        }
    }
    out
}

/// Mark subject pixels that have at least one background 8-neighbor.
#[must_use = "returns the outline mask"]
pub fn detect_outline(background: &GrayImage) -> GrayImage {
    let (w, h) = background.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if background.get_pixel(x, y).0[0] == MASK_ON {
            return image::Luma([MASK_OFF]);
        }
        let touches = NEIGHBORS_8
            .iter()
            .filter_map(|&d| offset(x, y, d, w, h))
            .any(|(nx, ny)| background.get_pixel(nx, ny).0[0] == MASK_ON);
        image::Luma([if touches { MASK_ON } else { MASK_OFF }])
    })
}

/// Inclusive bounding box `(min_x, min_y, max_x, max_y)` of the set
/// pixels in `mask`.
fn bounding_box(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] == MASK_ON)
        .fold(None, |acc, (x, y, _)| match acc {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
}

/// Find a subject pixel that is not on the outline.
///
/// Square rings around the bounding box center are searched first, out
/// to a quarter of the box's shorter side; if none of them holds an
/// interior pixel the whole box is scanned row by row.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn find_interior_seed(background: &GrayImage, outline: &GrayImage) -> Option<(u32, u32)> {
    let (min_x, min_y, max_x, max_y) = bounding_box(outline)?;
    let interior = |x: u32, y: u32| {
        background.get_pixel(x, y).0[0] != MASK_ON && outline.get_pixel(x, y).0[0] != MASK_ON
    };

    let cx = i64::from(min_x + (max_x - min_x) / 2);
    let cy = i64::from(min_y + (max_y - min_y) / 2);
    let reach = i64::from((max_x - min_x + 1).min(max_y - min_y + 1) / 4);
    let inside = |x: i64, y: i64| {
        x >= i64::from(min_x) && x <= i64::from(max_x) && y >= i64::from(min_y) && y <= i64::from(max_y)
    };

    for r in 0..=reach {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs() != r && dy.abs() != r {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if inside(x, y) && interior(x as u32, y as u32) {
                    return Some((x as u32, y as u32));
                }
            }
        }
    }

    (min_y..=max_y)
        .flat_map(|y| (min_x..=max_x).map(move |x| (x, y)))
        .find(|&(x, y)| interior(x, y))
}

/// Build the clean subject mask ([`MASK_ON`] = keep) from a background
/// mask.
///
/// Outline pixels are never part of the result. When the image has no
/// outline at all (only background, or no background) every
/// non-background pixel is kept. When the outline has no interior, the
/// mask is empty.
#[must_use = "returns the subject mask"]
pub fn subject_mask(background: &GrayImage) -> GrayImage {
    let (w, h) = background.dimensions();
    let outline = detect_outline(background);

    if bounding_box(&outline).is_none() {
        return GrayImage::from_fn(w, h, |x, y| {
            let bg = background.get_pixel(x, y).0[0] == MASK_ON;
            image::Luma([if bg { MASK_OFF } else { MASK_ON }])
        });
    }

    let mut mask = GrayImage::new(w, h);
    let Some(seed) = find_interior_seed(background, &outline) else {
        return mask;
    };

    let fillable = |x: u32, y: u32| {
        background.get_pixel(x, y).0[0] != MASK_ON && outline.get_pixel(x, y).0[0] != MASK_ON
    };

    let mut stack = vec![seed];
    mask.put_pixel(seed.0, seed.1, image::Luma([MASK_ON]));
    while let Some((x, y)) = stack.pop() {
        for &d in &NEIGHBORS_4 {
            if let Some((nx, ny)) = offset(x, y, d, w, h)
                && mask.get_pixel(nx, ny).0[0] != MASK_ON
                && fillable(nx, ny)
            {
                mask.put_pixel(nx, ny, image::Luma([MASK_ON]));
                stack.push((nx, ny));
            }
        }
    }

    mask
}

/// Remove the background of `image`.
///
/// Transparent fill yields the DST_IN cutout. Opaque fills flatten the
/// cutout onto the fill color.
#[must_use = "returns the edited image"]
pub fn remove_background(
    image: &RgbaImage,
    classifier: BackgroundClassifier,
    config: &SegmentationConfig,
    fill: BackgroundFill,
) -> RgbaImage {
    let background = classifier.classify(image, config);
    let mask = subject_mask(&background);
    let cutout = apply_mask(image, &mask);
    if fill.is_opaque() {
        flatten_onto(&cutout, fill.rgba())
    } else {
        cutout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);

    /// 30x30 white backdrop with a 10x10 textured subject at (10, 10).
    ///
    /// The texture never repeats between 8-neighbors, so no subject pixel
    /// has a similar neighbor.
    fn textured_subject() -> RgbaImage {
        RgbaImage::from_fn(30, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                #[allow(clippy::cast_possible_truncation)]
                let v = (((x * 7 + y * 13) % 16) * 16) as u8;
                image::Rgba([v, v, v, 255])
            } else {
                WHITE
            }
        })
    }

    fn count_on(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == MASK_ON).count()
    }

    #[test]
    fn default_is_neighbor_similarity() {
        assert_eq!(
            BackgroundClassifier::default(),
            BackgroundClassifier::NeighborSimilarity
        );
    }

    #[test]
    fn flat_backdrop_is_background_and_texture_is_not() {
        let bg = classify_neighbor_similarity(&textured_subject(), &SegmentationConfig::default());
        assert_eq!(bg.get_pixel(0, 0).0[0], MASK_ON);
        assert_eq!(bg.get_pixel(9, 9).0[0], MASK_ON);
        assert_eq!(bg.get_pixel(15, 15).0[0], MASK_OFF);
        assert_eq!(count_on(&bg), 30 * 30 - 100);
    }

    #[test]
    fn parallel_rows_match_sequential_classification() {
        let img = RgbaImage::from_fn(17, 13, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let v = ((x / 3 + y / 2) * 40 % 256) as u8;
            image::Rgba([v, v / 2, 0, 255])
        });
        let config = SegmentationConfig::default();
        let bg = classify_neighbor_similarity(&img, &config);

        for (x, y, p) in bg.enumerate_pixels() {
            let center = *img.get_pixel(x, y);
            let count = NEIGHBORS_8
                .iter()
                .filter_map(|&d| offset(x, y, d, 17, 13))
                .filter(|&(nx, ny)| similar(center, *img.get_pixel(nx, ny), 2))
                .count();
            let expected = if count >= 3 { MASK_ON } else { MASK_OFF };
            assert_eq!(p.0[0], expected, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn outline_is_subject_border() {
        let bg = classify_neighbor_similarity(&textured_subject(), &SegmentationConfig::default());
        let outline = detect_outline(&bg);
        assert_eq!(outline.get_pixel(10, 10).0[0], MASK_ON);
        assert_eq!(outline.get_pixel(19, 14).0[0], MASK_ON);
        assert_eq!(outline.get_pixel(15, 15).0[0], MASK_OFF);
        assert_eq!(outline.get_pixel(0, 0).0[0], MASK_OFF);
        assert_eq!(count_on(&outline), 36);
    }

    #[test]
    fn subject_mask_never_contains_outline() {
        let bg = classify_neighbor_similarity(&textured_subject(), &SegmentationConfig::default());
        let outline = detect_outline(&bg);
        let mask = subject_mask(&bg);
        assert_eq!(count_on(&mask), 64);
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[0] == MASK_ON {
                assert_eq!(outline.get_pixel(x, y).0[0], MASK_OFF, "({x}, {y})");
            }
        }
    }

    #[test]
    fn seed_is_found_off_center() {
        // Outline ring whose center pixel is background: the ring search
        // must step away from the center to find interior.
        let mut bg = GrayImage::from_pixel(21, 21, image::Luma([MASK_ON]));
        for y in 2..19 {
            for x in 2..19 {
                bg.put_pixel(x, y, image::Luma([MASK_OFF]));
            }
        }
        bg.put_pixel(10, 10, image::Luma([MASK_ON]));
        let outline = detect_outline(&bg);
        let seed = find_interior_seed(&bg, &outline).unwrap_or((0, 0));
        assert_eq!(bg.get_pixel(seed.0, seed.1).0[0], MASK_OFF);
        assert_eq!(outline.get_pixel(seed.0, seed.1).0[0], MASK_OFF);
    }

    #[test]
    fn outline_without_interior_gives_empty_mask() {
        // A two-pixel-wide stripe is all outline.
        let bg = GrayImage::from_fn(10, 10, |x, _| {
            image::Luma([if x == 4 || x == 5 { MASK_OFF } else { MASK_ON }])
        });
        assert_eq!(count_on(&subject_mask(&bg)), 0);
    }

    #[test]
    fn no_background_keeps_everything() {
        let bg = GrayImage::new(6, 4);
        assert_eq!(count_on(&subject_mask(&bg)), 24);
    }

    #[test]
    fn transparent_removal_keeps_interior_colors() {
        let img = textured_subject();
        let out = remove_background(
            &img,
            BackgroundClassifier::NeighborSimilarity,
            &SegmentationConfig::default(),
            BackgroundFill::Transparent,
        );
        assert_eq!(out.get_pixel(15, 15), img.get_pixel(15, 15));
        assert_eq!(out.get_pixel(10, 10).0[3], 0);
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn blue_fill_is_opaque() {
        let img = textured_subject();
        let out = remove_background(
            &img,
            BackgroundClassifier::NeighborSimilarity,
            &SegmentationConfig::default(),
            BackgroundFill::Blue,
        );
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(15, 15), img.get_pixel(15, 15));
        assert!(out.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn raw_fill_replaces_only_background() {
        let img = textured_subject();
        let bg = classify_neighbor_similarity(&img, &SegmentationConfig::default());
        let raw = fill_background(&img, &bg, BackgroundFill::Blue);
        assert_eq!(raw.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(raw.get_pixel(10, 10), img.get_pixel(10, 10));
    }

    #[test]
    fn luminance_threshold_separates_dark_subject() {
        let img = RgbaImage::from_fn(20, 20, |x, y| {
            if (5..15).contains(&x) && (5..15).contains(&y) {
                image::Rgba([30, 30, 30, 255])
            } else {
                image::Rgba([230, 230, 230, 255])
            }
        });
        let bg = BackgroundClassifier::LuminanceThreshold.classify(&img, &SegmentationConfig::default());
        assert_eq!(bg.get_pixel(0, 0).0[0], MASK_ON);
        assert_eq!(bg.get_pixel(10, 10).0[0], MASK_OFF);
    }

    #[test]
    fn empty_image_classifies_to_empty_mask() {
        let img = RgbaImage::new(0, 0);
        let bg = classify_neighbor_similarity(&img, &SegmentationConfig::default());
        assert_eq!(bg.dimensions(), (0, 0));
    }
}
