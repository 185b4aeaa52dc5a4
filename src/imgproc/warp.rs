use image::{Rgb, RgbImage};
use nalgebra::Point2;

use crate::features::Homography;

#[inline]
fn get_rgb(src: &RgbImage, x: i32, y: i32) -> [f32; 3] {
    if x < 0 || y < 0 || x >= src.width() as i32 || y >= src.height() as i32 {
        return [0.0; 3];
    }
    let p = src.get_pixel(x as u32, y as u32);
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

/// Bilinear sample; samples falling outside the image read as black.
#[inline]
pub fn sample_bilinear_rgb(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_rgb(src, x0, y0);
    let p10 = get_rgb(src, x0 + 1, y0);
    let p01 = get_rgb(src, x0, y0 + 1);
    let p11 = get_rgb(src, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let a = p00[c] + fx * (p10[c] - p00[c]);
        let b = p01[c] + fx * (p11[c] - p01[c]);
        out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp `src` through `h_dst_from_src` onto an `out_w` x `out_h` grid.
///
/// Every destination pixel is pulled back through the inverse transform and
/// sampled bilinearly; pixels that land outside the source stay black.
/// Returns `None` when the transform is singular.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    h_dst_from_src: &Homography,
    out_w: u32,
    out_h: u32,
) -> Option<RgbImage> {
    let _span = tracing::debug_span!("warp_perspective", out_w, out_h).entered();

    let h_src_from_dst = h_dst_from_src.inverse()?;
    let mut out = RgbImage::new(out_w, out_h);
    let max_x = src.width() as f32 - 1.0;
    let max_y = src.height() as f32 - 1.0;

    for y in 0..out_h {
        for x in 0..out_w {
            let p = h_src_from_dst.apply(Point2::new(x as f32, y as f32));
            if !p.x.is_finite() || !p.y.is_finite() {
                continue;
            }
            // Within half a pixel of the border counts as the border pixel.
            if p.x < -0.5 || p.y < -0.5 || p.x > max_x + 0.5 || p.y > max_y + 0.5 {
                continue;
            }
            let sx = p.x.clamp(0.0, max_x.max(0.0));
            let sy = p.y.clamp(0.0, max_y.max(0.0));
            out.put_pixel(x, y, sample_bilinear_rgb(src, sx, sy));
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 7]))
    }

    #[test]
    fn identity_warp_is_lossless() {
        let src = gradient(40, 30);
        let identity = Homography::new(Matrix3::identity());
        let out = warp_perspective_rgb(&src, &identity, 40, 30).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn translation_shifts_content() {
        let src = gradient(40, 30);
        // Destination = source shifted 3 px right and 2 px down.
        let shift = Homography::new(Matrix3::new(
            1.0, 0.0, 3.0, //
            0.0, 1.0, 2.0, //
            0.0, 0.0, 1.0,
        ));
        let out = warp_perspective_rgb(&src, &shift, 40, 30).unwrap();

        assert_eq!(out.get_pixel(13, 12), src.get_pixel(10, 10));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn singular_transform_is_rejected() {
        let src = gradient(8, 8);
        let singular = Homography::new(Matrix3::zeros());
        assert!(warp_perspective_rgb(&src, &singular, 8, 8).is_none());
    }

    #[test]
    fn bilinear_midpoint_averages() {
        let src = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 0 } else { 100 }, 0, 0]));
        assert_eq!(sample_bilinear_rgb(&src, 0.5, 0.0)[0], 50);
    }
}
