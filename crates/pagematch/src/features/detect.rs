//! Pyramid construction, FAST detection, Harris ranking, orientation.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};

use super::{OrbConfig, PATCH_RADIUS};

/// Extra margin beyond the patch radius so rotated BRIEF samples stay inside.
const DESCRIBE_MARGIN: u32 = PATCH_RADIUS as u32 + 5;
const HARRIS_BLOCK_RADIUS: i32 = 3;

pub(super) struct PyramidLevel {
    pub image: GrayImage,
    pub octave: u8,
    /// Level-to-level-0 scale for x and y.
    pub scale: [f32; 2],
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub x: u32,
    pub y: u32,
    pub response: f32,
    pub angle: f32,
}

fn border(config: &OrbConfig) -> u32 {
    config.edge_threshold.max(DESCRIBE_MARGIN)
}

pub(super) fn build_pyramid(gray: &GrayImage, config: &OrbConfig) -> Vec<PyramidLevel> {
    let (w0, h0) = gray.dimensions();
    let min_side = 2 * border(config) + 1;
    let mut levels = Vec::new();
    if w0 < min_side || h0 < min_side {
        return levels;
    }
    levels.push(PyramidLevel {
        image: gray.clone(),
        octave: 0,
        scale: [1.0, 1.0],
    });

    let n_levels = config.n_levels.clamp(1, u8::MAX as usize);
    if !(config.scale_factor.is_finite() && config.scale_factor > 1.0) {
        if n_levels > 1 {
            tracing::warn!(
                "scale_factor {} is not > 1; using a single pyramid level",
                config.scale_factor
            );
        }
        return levels;
    }

    for octave in 1..n_levels {
        let s = config.scale_factor.powi(octave as i32);
        let w = (w0 as f32 / s).round() as u32;
        let h = (h0 as f32 / s).round() as u32;
        if w < min_side || h < min_side {
            break;
        }
        let prev = &levels[levels.len() - 1].image;
        let image = imageops::resize(prev, w, h, FilterType::Triangle);
        levels.push(PyramidLevel {
            image,
            octave: octave as u8,
            scale: [w0 as f32 / w as f32, h0 as f32 / h as f32],
        });
    }
    levels
}

/// Split `max_features` across levels as a geometric series in the inverse
/// scale factor; the last level absorbs the rounding remainder.
pub(super) fn level_budgets(config: &OrbConfig, n_levels: usize) -> Vec<usize> {
    if n_levels == 0 {
        return Vec::new();
    }
    if n_levels == 1 {
        return vec![config.max_features];
    }
    let factor = 1.0 / config.scale_factor as f64;
    let mut per_level = config.max_features as f64 * (1.0 - factor)
        / (1.0 - factor.powi(n_levels as i32));

    let mut budgets = Vec::with_capacity(n_levels);
    let mut assigned = 0usize;
    for _ in 0..n_levels - 1 {
        let n = (per_level.round() as usize).min(config.max_features - assigned);
        budgets.push(n);
        assigned += n;
        per_level *= factor;
    }
    budgets.push(config.max_features - assigned);
    budgets
}

pub(super) fn detect_level(level: &PyramidLevel, budget: usize, config: &OrbConfig) -> Vec<Candidate> {
    let img = &level.image;
    let (w, h) = img.dimensions();
    let b = border(config);

    let corners: Vec<_> = imageproc::corners::corners_fast9(img, config.fast_threshold)
        .into_iter()
        .filter(|c| c.x >= b && c.y >= b && c.x < w - b && c.y < h - b)
        .collect();
    if corners.is_empty() {
        return Vec::new();
    }

    // 3x3 non-maximum suppression on FAST score. Ties keep the first corner in
    // raster order.
    let mut score_map = vec![0.0f32; (w * h) as usize];
    for c in &corners {
        score_map[(c.y * w + c.x) as usize] = c.score.max(f32::MIN_POSITIVE);
    }
    let survivors = corners.iter().filter(|c| {
        let s = score_map[(c.y * w + c.x) as usize];
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = (c.x as i32 + dx) as u32;
                let ny = (c.y as i32 + dy) as u32;
                let ns = score_map[(ny * w + nx) as usize];
                let earlier = dy < 0 || (dy == 0 && dx < 0);
                if ns > s || (earlier && ns == s) {
                    return false;
                }
            }
        }
        true
    });

    let gx = imageproc::gradients::horizontal_sobel(img);
    let gy = imageproc::gradients::vertical_sobel(img);

    let mut ranked: Vec<Candidate> = survivors
        .map(|c| Candidate {
            x: c.x,
            y: c.y,
            response: harris_response(&gx, &gy, c.x, c.y, config.harris_k),
            angle: 0.0,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    ranked.truncate(budget);

    for c in &mut ranked {
        c.angle = intensity_centroid_angle(img, c.x, c.y);
    }
    ranked
}

fn harris_response(
    gx: &ImageBuffer<Luma<i16>, Vec<i16>>,
    gy: &ImageBuffer<Luma<i16>, Vec<i16>>,
    x: u32,
    y: u32,
    k: f32,
) -> f32 {
    let norm = 1.0 / (4.0 * (2 * HARRIS_BLOCK_RADIUS + 1) as f32 * 255.0);
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
        for dx in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
            let px = (x as i32 + dx) as u32;
            let py = (y as i32 + dy) as u32;
            let ix = gx.get_pixel(px, py)[0] as f32 * norm;
            let iy = gy.get_pixel(px, py)[0] as f32 * norm;
            sxx += ix * ix;
            syy += iy * iy;
            sxy += ix * iy;
        }
    }
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    det - k * trace * trace
}

/// Orientation from the intensity centroid of a circular patch.
fn intensity_centroid_angle(img: &GrayImage, x: u32, y: u32) -> f32 {
    let r = PATCH_RADIUS;
    let (mut m10, mut m01) = (0.0f32, 0.0f32);
    for dy in -r..=r {
        let span = ((r * r - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}
