//! Shared synthetic-image helpers for unit tests.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const PAPER: u8 = 235;

fn fill_rect(img: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32, v: u8) {
    let (iw, ih) = img.dimensions();
    for y in y0..(y0 + h).min(ih) {
        for x in x0..(x0 + w).min(iw) {
            img.put_pixel(x, y, Luma([v]));
        }
    }
}

fn outline_rect(img: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32, t: u32, v: u8) {
    fill_rect(img, x0, y0, w, t, v);
    fill_rect(img, x0, y0 + h - t, w, t, v);
    fill_rect(img, x0, y0, t, h, v);
    fill_rect(img, x0 + w - t, y0, t, h, v);
}

/// Render a printed-form lookalike: page frame, header bar, field boxes and
/// rows of glyph-like blocks at seeded random positions.
pub(crate) fn synthetic_form(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = GrayImage::from_pixel(w, h, Luma([PAPER]));

    let m = (w.min(h) / 40).max(4);
    outline_rect(&mut img, m, m, w - 2 * m, h - 2 * m, 2, 40);
    fill_rect(&mut img, 2 * m, 2 * m, w - 4 * m, (h / 14).max(6), 60);

    // Field boxes.
    let n_boxes = (w * h / 40_000).max(3);
    for _ in 0..n_boxes {
        let bw = rng.gen_range(w / 8..w / 3);
        let bh = rng.gen_range(h / 12..h / 5);
        let bx = rng.gen_range(2 * m..w - 2 * m - bw);
        let by = rng.gen_range(h / 6..h - 2 * m - bh);
        outline_rect(&mut img, bx, by, bw, bh, rng.gen_range(1..3), rng.gen_range(30..90));
    }

    // Text-like rows.
    let mut y = h / 6;
    while y + 16 < h - 2 * m {
        if rng.gen_bool(0.75) {
            let mut x = 3 * m + rng.gen_range(0..w / 6);
            let end = w - 3 * m - rng.gen_range(0..w / 5);
            while x + 14 < end {
                let gw = rng.gen_range(5..14);
                let gh = rng.gen_range(7..15);
                fill_rect(&mut img, x, y + 14 - gh, gw, gh, rng.gen_range(20..90));
                x += gw + rng.gen_range(2..7);
                if rng.gen_bool(0.15) {
                    x += rng.gen_range(8..20);
                }
            }
        }
        y += rng.gen_range(22..30);
    }
    img
}

/// Similarity about the template center followed by a shift, as a
/// template-to-capture matrix.
pub(crate) fn similarity_about_center(
    template_size: (u32, u32),
    capture_size: (u32, u32),
    angle_deg: f64,
    scale: f64,
) -> Matrix3<f64> {
    let (tcx, tcy) = (template_size.0 as f64 / 2.0, template_size.1 as f64 / 2.0);
    let (ccx, ccy) = (capture_size.0 as f64 / 2.0, capture_size.1 as f64 / 2.0);
    let (s, c) = angle_deg.to_radians().sin_cos();
    let to_origin = Matrix3::new(1.0, 0.0, -tcx, 0.0, 1.0, -tcy, 0.0, 0.0, 1.0);
    let rot_scale = Matrix3::new(scale * c, -scale * s, 0.0, scale * s, scale * c, 0.0, 0.0, 0.0, 1.0);
    let to_capture = Matrix3::new(1.0, 0.0, ccx, 0.0, 1.0, ccy, 0.0, 0.0, 1.0);
    to_capture * rot_scale * to_origin
}

/// Warp `template` into a `size` canvas through the template-to-capture
/// matrix `t`. Uncovered pixels take `background`.
pub(crate) fn render_capture(
    template: &GrayImage,
    t: &Matrix3<f64>,
    size: (u32, u32),
    background: u8,
) -> GrayImage {
    let m: Vec<f32> = t.transpose().iter().map(|v| *v as f32).collect();
    let mut row_major = [0.0f32; 9];
    row_major.copy_from_slice(&m);
    let projection = Projection::from_matrix(row_major).expect("test transform is invertible");
    let mut out = GrayImage::from_pixel(size.0, size.1, Luma([background]));
    warp_into(
        template,
        &projection,
        Interpolation::Bilinear,
        Luma([background]),
        &mut out,
    );
    out
}

/// Add zero-mean Gaussian noise with standard deviation `sigma`.
pub(crate) fn add_gaussian_noise(img: &GrayImage, sigma: f64, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).expect("sigma is positive");
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = p[0] as f64 + normal.sample(&mut rng);
        p[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Normalized cross-correlation of two equally sized images, ignoring a
/// `margin`-pixel frame.
pub(crate) fn ncc(a: &GrayImage, b: &GrayImage, margin: u32) -> f64 {
    assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = a.dimensions();
    let mut pairs = Vec::new();
    for y in margin..h - margin {
        for x in margin..w - margin {
            pairs.push((a.get_pixel(x, y)[0] as f64, b.get_pixel(x, y)[0] as f64));
        }
    }
    let n = pairs.len() as f64;
    let ma = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mb = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (va, vb) in pairs {
        sab += (va - ma) * (vb - mb);
        saa += (va - ma).powi(2);
        sbb += (vb - mb).powi(2);
    }
    sab / (saa.sqrt() * sbb.sqrt()).max(1e-12)
}
