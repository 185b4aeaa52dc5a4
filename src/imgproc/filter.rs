//! Intensity conversion and smoothing filters.

use image::{GrayImage, Luma, RgbImage};

/// Convert RGB to 8-bit intensity with BT.601 weights.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        Luma([luma(p[0], p[1], p[2])])
    })
}

/// Fixed-point `0.299 R + 0.587 G + 0.114 B`, rounded.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    const SHIFT: u32 = 14;
    let v = r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << (SHIFT - 1));
    (v >> SHIFT).min(255) as u8
}

/// Edge-preserving bilateral filter.
///
/// Each output pixel is a weighted mean over a disk of diameter `diameter`,
/// where the weight falls off with spatial distance (`sigma_space`) and with
/// intensity difference (`sigma_color`). Borders are clamped.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let _span = tracing::debug_span!("bilateral_filter").entered();

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let sigma_color = if sigma_color > 0.0 { sigma_color } else { 1.0 };
    let sigma_space = if sigma_space > 0.0 { sigma_space } else { 1.0 };
    let radius = (diameter.max(1) / 2) as i32;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let mut color_weight = [0f32; 256];
    for (i, w) in color_weight.iter_mut().enumerate() {
        let d = i as f32;
        *w = (d * d * color_coeff).exp();
    }

    let mut taps: Vec<(i32, i32, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() > radius as f32 {
                continue;
            }
            taps.push((dx, dy, (r2 * space_coeff).exp()));
        }
    }

    let src = image.as_raw();
    let w = width as i32;
    let h = height as i32;
    let mut out = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            let center = src[(y * w + x) as usize];
            let mut sum = 0f32;
            let mut wsum = 0f32;
            for &(dx, dy, ws) in &taps {
                let sx = (x + dx).clamp(0, w - 1);
                let sy = (y + dy).clamp(0, h - 1);
                let v = src[(sy * w + sx) as usize];
                let weight = ws * color_weight[center.abs_diff(v) as usize];
                sum += weight * v as f32;
                wsum += weight;
            }
            out[(y * w + x) as usize] = (sum / wsum).round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

/// Normalized 1-D Gaussian kernel of odd length `ksize`.
///
/// `sigma <= 0` derives sigma from the kernel size.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (ksize / 2) as f32;
    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }
    kernel
}

/// Separable Gaussian blur with clamped borders, in floating point.
pub fn gaussian_blur(image: &GrayImage, ksize: u32, sigma: f32) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let kernel = gaussian_kernel(ksize, sigma);
    let radius = (kernel.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    let src = image.as_raw();

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let sx = (x + k as i32 - radius).clamp(0, w - 1);
                acc += kv * src[(y * w + sx) as usize] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut out = vec![0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let sy = (y + k as i32 - radius).clamp(0, h - 1);
                acc += kv * horizontal[(sy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    fn luma_of_primaries() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn to_gray_keeps_dimensions() {
        let rgb = RgbImage::from_pixel(7, 3, Rgb([10, 10, 10]));
        let gray = to_gray(&rgb);
        assert_eq!(gray.dimensions(), (7, 3));
        assert!(gray.pixels().all(|p| p[0] == 10));
    }

    #[test]
    fn bilateral_leaves_flat_image_unchanged() {
        let img = GrayImage::from_pixel(20, 20, Luma([255]));
        let out = bilateral_filter(&img, 9, 75.0, 75.0);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn bilateral_preserves_strong_edge() {
        let img = GrayImage::from_fn(30, 10, |x, _| Luma([if x < 15 { 0 } else { 255 }]));
        let out = bilateral_filter(&img, 5, 50.0, 50.0);
        assert!(out.get_pixel(14, 5)[0] < 5);
        assert!(out.get_pixel(15, 5)[0] > 250);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(31, 0.0);
        assert_eq!(k.len(), 31);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(k[0], k[30], epsilon = 1e-7);
        assert!(k[15] > k[14]);
    }

    #[test]
    fn gaussian_blur_of_constant_is_constant() {
        let img = GrayImage::from_pixel(12, 9, Luma([80]));
        let out = gaussian_blur(&img, 7, 0.0);
        for v in out {
            assert_relative_eq!(v, 80.0, epsilon = 1e-3);
        }
    }
}
