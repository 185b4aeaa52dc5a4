use image::{Rgb, RgbImage};

use super::ink::InkLayer;

/// White canvas with every ink pixel painted in its stroke colour.
pub fn composite(ink: &InkLayer) -> RgbImage {
    let _span = tracing::debug_span!("composite").entered();

    let (width, height) = ink.mask.dimensions();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if ink.mask.get(x, y) {
            *pixel = *ink.stroke_color.get_pixel(x, y);
        }
    }
    canvas
}
