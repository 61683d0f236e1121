//! Alpha compositing: mask application, flattening, and feathered
//! overlay blending.

use image::imageops;
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

use crate::blur::gaussian_blur;
use crate::types::{GrayImage, OverlayConfig, PipelineError, Point, RgbaImage};

/// Keep `image` where `mask` is set (DST_IN).
///
/// Each output alpha is the source alpha scaled by the mask value. Color
/// channels are left alone, so edge pixels keep their original color.
/// Pixels that end up fully transparent, or fall outside the mask, become
/// `[0, 0, 0, 0]`.
#[must_use = "returns the masked image"]
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let m = mask.get_pixel_checked(x, y).map_or(0, |p| p.0[0]);
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = scale(a, m);
        if alpha == 0 {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba([r, g, b, alpha])
        }
    })
}

/// `a * b / 255`, rounded.
#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
const fn scale(a: u8, b: u8) -> u8 {
    ((a as u16 * b as u16 + 127) / 255) as u8
}

/// Composite `image` over a solid color (source-over), giving an opaque
/// result.
#[must_use = "returns the flattened image"]
pub fn flatten_onto(image: &RgbaImage, color: image::Rgba<u8>) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let a = pixel.0[3];
        for c in 0..3 {
            let over = u16::from(pixel.0[c]) * u16::from(a) + u16::from(color.0[c]) * u16::from(255 - a);
            #[allow(clippy::cast_possible_truncation)]
            let value = ((over + 127) / 255) as u8;
            pixel.0[c] = value;
        }
        pixel.0[3] = 255;
    }
    out
}

/// A detected face, in base image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Upper-body trapezoid below a face, clockwise from the top-left.
///
/// The narrow top edge sits under the chin, the wide bottom edge spans
/// two and a half face widths across the shoulders.
#[must_use]
pub fn shoulder_quad(face: FaceBox) -> [Point; 4] {
    let fx = f64::from(face.x);
    let fw = f64::from(face.width);
    let fh = f64::from(face.height);

    let center_x = fx + fw / 2.0;
    let neck_top = f64::from(face.y) + fh;
    let shoulder_width = fw * 2.5;
    let shoulder_height = fh * 0.65;
    let top_width = fw * 0.8;

    let top = neck_top * 1.15;
    let bottom = neck_top + shoulder_height;
    [
        Point::new(top_width.mul_add(-0.32, center_x), top),
        Point::new(top_width.mul_add(0.32, center_x), top),
        Point::new(shoulder_width.mul_add(0.5, center_x), bottom),
        Point::new(shoulder_width.mul_add(-0.5, center_x), bottom),
    ]
}

/// One side of a clip rectangle.
#[derive(Debug, Clone, Copy)]
enum ClipEdge {
    Left(f64),
    Right(f64),
    Top(f64),
    Bottom(f64),
}

impl ClipEdge {
    fn inside(self, p: Point) -> bool {
        match self {
            Self::Left(v) => p.x >= v,
            Self::Right(v) => p.x <= v,
            Self::Top(v) => p.y >= v,
            Self::Bottom(v) => p.y <= v,
        }
    }

    /// Where segment `a`-`b` crosses this edge. Only called when exactly
    /// one end is inside, so the segment is never parallel to the edge.
    fn crossing(self, a: Point, b: Point) -> Point {
        match self {
            Self::Left(v) | Self::Right(v) => {
                let t = (v - a.x) / (b.x - a.x);
                Point::new(v, t.mul_add(b.y - a.y, a.y))
            }
            Self::Top(v) | Self::Bottom(v) => {
                let t = (v - a.y) / (b.y - a.y);
                Point::new(t.mul_add(b.x - a.x, a.x), v)
            }
        }
    }
}

/// Clip a polygon to the rectangle `[x0, x1] x [y0, y1]`
/// (Sutherland-Hodgman). Coverage inside the rectangle is unchanged.
fn clip_polygon(points: &[Point], x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
    let mut polygon = points.to_vec();
    for edge in [
        ClipEdge::Left(x0),
        ClipEdge::Right(x1),
        ClipEdge::Top(y0),
        ClipEdge::Bottom(y1),
    ] {
        let input = std::mem::take(&mut polygon);
        let Some(&last) = input.last() else {
            break;
        };
        let mut prev = last;
        for &cur in &input {
            match (edge.inside(prev), edge.inside(cur)) {
                (true, true) => polygon.push(cur),
                (true, false) => polygon.push(edge.crossing(prev, cur)),
                (false, true) => {
                    polygon.push(edge.crossing(prev, cur));
                    polygon.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }
    polygon
}

/// Rasterize `quad` into an anti-aliased coverage mask the size of the
/// base image.
///
/// The quad is clipped to just outside the canvas first, so far-away
/// corners never reach the rasterizer.
fn quad_mask(width: u32, height: u32, quad: &[Point; 4]) -> Result<GrayImage, PipelineError> {
    let polygon = clip_polygon(
        quad,
        -1.0,
        -1.0,
        f64::from(width) + 1.0,
        f64::from(height) + 1.0,
    );
    if polygon.len() < 3 {
        return Ok(GrayImage::new(width, height));
    }

    let mut pb = PathBuilder::new();
    #[allow(clippy::cast_possible_truncation)]
    let to_f32 = |p: Point| (p.x as f32, p.y as f32);
    let (x, y) = to_f32(polygon[0]);
    pb.move_to(x, y);
    for &p in &polygon[1..] {
        let (x, y) = to_f32(p);
        pb.line_to(x, y);
    }
    pb.close();
    let Some(path) = pb.finish() else {
        return Err(PipelineError::InvalidQuad);
    };

    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return Err(PipelineError::InvalidDimensions { width, height });
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    // Premultiplied white: the alpha byte is the coverage.
    let data = pixmap.data();
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let off = (y as usize * width as usize + x as usize) * 4;
        image::Luma([data[off + 3]])
    }))
}

/// Blend `overlay` into the region of `base` outlined by `quad`.
///
/// The overlay is stretched over the quad's bounding box. It is resampled
/// at most to the base image size and looked up by position within the
/// box, so a box far larger than the base costs no more than one the
/// size of the base. The quad is rasterized and blurred by
/// `config.feather_sigma` to soften its edges; each pixel then takes
/// `overlay * a + base * (1 - a)` where `a` is the overlay alpha times
/// the feathered mask. Pixels with `a` below `config.min_alpha` are left
/// untouched.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidQuad`] if a corner is not finite, the
/// quad is degenerate, or its bounding box misses the base image.
/// Returns [`PipelineError::InvalidDimensions`] if either image is empty.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names
)]
pub fn blend_overlay(
    base: &RgbaImage,
    overlay: &RgbaImage,
    quad: &[Point; 4],
    config: &OverlayConfig,
) -> Result<RgbaImage, PipelineError> {
    let (w, h) = base.dimensions();
    for img in [base, overlay] {
        if img.width() == 0 || img.height() == 0 {
            return Err(PipelineError::InvalidDimensions {
                width: img.width(),
                height: img.height(),
            });
        }
    }
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PipelineError::InvalidQuad);
    }

    let min_x = quad.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor();
    let max_x = quad.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil();
    let min_y = quad.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor();
    let max_y = quad.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil();

    let x0 = min_x.max(0.0);
    let x1 = max_x.min(f64::from(w));
    let y0 = min_y.max(0.0);
    let y1 = max_y.min(f64::from(h));
    if x0 >= x1 || y0 >= y1 {
        return Err(PipelineError::InvalidQuad);
    }

    let box_w = (max_x - min_x).max(1.0);
    let box_h = (max_y - min_y).max(1.0);
    let fit_w = box_w.min(f64::from(w)) as u32;
    let fit_h = box_h.min(f64::from(h)) as u32;
    let fitted = imageops::resize(overlay, fit_w, fit_h, imageops::FilterType::CatmullRom);
    let step_x = f64::from(fit_w) / box_w;
    let step_y = f64::from(fit_h) / box_h;

    let feathered = gaussian_blur(&quad_mask(w, h, quad)?, config.feather_sigma);

    let mut out = base.clone();
    for y in (y0 as u32)..(y1 as u32) {
        for x in (x0 as u32)..(x1 as u32) {
            let m = feathered.get_pixel(x, y).0[0];
            if m == 0 {
                continue;
            }
            let ox = (((f64::from(x) - min_x) * step_x) as u32).min(fit_w - 1);
            let oy = (((f64::from(y) - min_y) * step_y) as u32).min(fit_h - 1);
            let src = fitted.get_pixel(ox, oy).0;

            let alpha = f32::from(src[3]) / 255.0 * f32::from(m) / 255.0;
            if alpha < config.min_alpha {
                continue;
            }

            let dst = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let v = f32::from(src[c]).mul_add(alpha, f32::from(dst.0[c]) * (1.0 - alpha));
                dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            let a = (255.0f32).mul_add(alpha, f32::from(dst.0[3]) * (1.0 - alpha));
            dst.0[3] = a.round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(out)
}
