//! Global and local thresholding into boolean masks.

use image::GrayImage;

use super::filter::gaussian_blur;
use super::Mask;

/// Pixels strictly brighter than `threshold`.
pub fn binary(image: &GrayImage, threshold: u8) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        image.get_pixel(x, y)[0] > threshold
    })
}

/// Inverted Gaussian adaptive threshold.
///
/// A pixel is flagged when it is at least `c` darker than the
/// Gaussian-weighted mean of its `block_size` neighbourhood (the mean is
/// rounded to 8 bits first). Flat regions are never flagged for `c > 0`.
pub fn adaptive_gaussian_inv(image: &GrayImage, block_size: u32, c: f32) -> Mask {
    let _span = tracing::debug_span!("adaptive_threshold", block_size).entered();

    let means = gaussian_blur(image, block_size, 0.0);
    let src = image.as_raw();
    let width = image.width() as usize;

    Mask::from_fn(image.width(), image.height(), |x, y| {
        let idx = y as usize * width + x as usize;
        let mean = means[idx].round().clamp(0.0, 255.0);
        src[idx] as f32 <= mean - c
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn binary_is_strict() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([199 + x as u8]));
        let mask = binary(&img, 200);
        assert!(!mask.get(0, 0));
        assert!(!mask.get(1, 0));
        assert!(mask.get(2, 0));
    }

    #[test]
    fn adaptive_ignores_flat_regions() {
        let img = GrayImage::from_pixel(40, 40, Luma([230]));
        assert_eq!(adaptive_gaussian_inv(&img, 31, 5.0).count(), 0);
    }

    #[test]
    fn adaptive_flags_dark_square_only() {
        let img = GrayImage::from_fn(80, 80, |x, y| {
            let inside = (30..50).contains(&x) && (30..50).contains(&y);
            Luma([if inside { 20 } else { 250 }])
        });
        let mask = adaptive_gaussian_inv(&img, 31, 5.0);

        for y in 0..80 {
            for x in 0..80 {
                let inside = (30..50).contains(&x) && (30..50).contains(&y);
                assert_eq!(mask.get(x, y), inside, "pixel ({x}, {y})");
            }
        }
    }
}
