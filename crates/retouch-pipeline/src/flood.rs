//! Seeded tolerance flood fill for manual background removal.
//!
//! Each seed floods the 4-connected region whose RGB colors stay within
//! `tolerance` (per channel, inclusive) of the seed's own color. Filled
//! pixels keep their RGB and become fully transparent. A pixel filled by
//! one seed is never revisited by a later one.
//!
//! Colors are compared on RGB only, so running the fill again on its own
//! output with the same seeds selects the same pixels and changes nothing.

use crate::types::{PipelineError, RgbaImage, Seed};

/// Whether every RGB channel of `a` is within `tolerance` of `b`.
fn within(a: image::Rgba<u8>, b: image::Rgba<u8>, tolerance: u8) -> bool {
    a.0[..3]
        .iter()
        .zip(&b.0[..3])
        .all(|(&ca, &cb)| ca.abs_diff(cb) <= tolerance)
}

/// Flood fill from every seed and clear the alpha of the filled pixels.
///
/// All seeds are checked against the image bounds before any pixel is
/// touched.
///
/// # Errors
///
/// Returns [`PipelineError::SeedOutOfBounds`] for the first seed outside
/// the image.
pub fn flood_fill(image: &RgbaImage, seeds: &[Seed], tolerance: u8) -> Result<RgbaImage, PipelineError> {
    let (w, h) = image.dimensions();
    if let Some(&seed) = seeds.iter().find(|s| s.x >= w || s.y >= h) {
        return Err(PipelineError::SeedOutOfBounds {
            seed,
            width: w,
            height: h,
        });
    }

    let index = |x: u32, y: u32| y as usize * w as usize + x as usize;
    let mut filled = vec![false; w as usize * h as usize];
    let mut stack = Vec::new();

    for seed in seeds {
        if filled[index(seed.x, seed.y)] {
            continue;
        }
        let target = *image.get_pixel(seed.x, seed.y);
        filled[index(seed.x, seed.y)] = true;
        stack.push((seed.x, seed.y));

        while let Some((x, y)) = stack.pop() {
            let neighbors = [
                x.checked_sub(1).map(|nx| (nx, y)),
                (x + 1 < w).then_some((x + 1, y)),
                y.checked_sub(1).map(|ny| (x, ny)),
                (y + 1 < h).then_some((x, y + 1)),
            ];
            for (nx, ny) in neighbors.into_iter().flatten() {
                let i = index(nx, ny);
                if !filled[i] && within(*image.get_pixel(nx, ny), target, tolerance) {
                    filled[i] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }

    let mut out = image.clone();
    for (pixel, &hit) in out.pixels_mut().zip(&filled) {
        if hit {
            pixel.0[3] = 0;
        }
    }
    Ok(out)
}
