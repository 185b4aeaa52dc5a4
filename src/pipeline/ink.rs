use image::{Rgb, RgbImage};

use super::background::median_u8;
use super::window::TemporalWindow;
use crate::config::InkConfig;
use crate::imgproc::{bilateral_filter, morph, threshold, to_gray, Mask, StructuringElement};

/// Stroke shape plus recovered colour, in background coordinates.
#[derive(Clone, Debug)]
pub struct InkLayer {
    pub mask: Mask,
    /// Meaningful only where `mask` is set.
    pub stroke_color: RgbImage,
}

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub struct InkExtractor {
    config: InkConfig,
}

impl InkExtractor {
    pub fn new(config: InkConfig) -> Self {
        Self { config }
    }

    /// Pixels darker than their local neighbourhood, cleaned up morphologically.
    pub fn detect_ink(&self, background: &RgbImage) -> Mask {
        let _span = tracing::debug_span!("detect_ink").entered();
        let cfg = &self.config;

        let gray = bilateral_filter(
            &to_gray(background),
            cfg.bilateral_diameter,
            cfg.bilateral_sigma_color,
            cfg.bilateral_sigma_space,
        );
        let candidates = threshold::adaptive_gaussian_inv(&gray, cfg.block_size(), cfg.adaptive_c);

        let opened = morph::open(
            &candidates,
            &StructuringElement::ellipse(cfg.open_kernel, cfg.open_kernel),
        );
        morph::close(
            &opened,
            &StructuringElement::ellipse(cfg.close_kernel, cfg.close_kernel),
        )
    }

    /// Temporal median of every ink pixel over the frames where it is not
    /// occluded. Pixels with no such sample are white.
    pub fn recover_colors(&self, window: &TemporalWindow, ink: &Mask) -> RgbImage {
        let _span = tracing::debug_span!("stroke_colors").entered();

        let (width, height) = ink.dimensions();
        let mut colors = RgbImage::from_pixel(width, height, WHITE);
        let mut samples: [Vec<u8>; 3] = Default::default();

        for y in 0..height {
            for x in 0..width {
                if !ink.get(x, y) {
                    continue;
                }
                for channel in samples.iter_mut() {
                    channel.clear();
                }
                for entry in window.iter().filter(|e| !e.occupancy.get(x, y)) {
                    let p = entry.frame.get_pixel(x, y);
                    for (c, channel) in samples.iter_mut().enumerate() {
                        channel.push(p[c]);
                    }
                }
                let [r, g, b] = &mut samples;
                if let (Some(r), Some(g), Some(b)) = (median_u8(r), median_u8(g), median_u8(b)) {
                    colors.put_pixel(x, y, Rgb([r, g, b]));
                }
            }
        }
        colors
    }

    pub fn extract(&self, background: &RgbImage, window: &TemporalWindow) -> InkLayer {
        let mask = self.detect_ink(background);
        let stroke_color = self.recover_colors(window, &mask);
        tracing::debug!(ink_pixels = mask.count(), "ink extracted");
        InkLayer { mask, stroke_color }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: Rgb<u8> = Rgb([250, 250, 250]);
    const MARKER: Rgb<u8> = Rgb([30, 60, 200]);

    fn board_with_stroke(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (20..40).contains(&x) && (30..36).contains(&y) {
                MARKER
            } else {
                BOARD
            }
        })
    }

    #[test]
    fn blank_board_has_no_ink() {
        let extractor = InkExtractor::new(InkConfig::default());
        let mask = extractor.detect_ink(&RgbImage::from_pixel(60, 60, BOARD));
        assert!(!mask.any());
    }

    #[test]
    fn dark_stroke_is_detected() {
        let extractor = InkExtractor::new(InkConfig::default());
        let mask = extractor.detect_ink(&board_with_stroke(64, 64));

        assert!(mask.get(30, 32));
        assert!(mask.get(21, 33));
        assert!(!mask.get(10, 10));
        assert!(!mask.get(30, 45));
        // Nothing beyond a pixel of the stroke.
        for y in 0..64 {
            for x in 0..64 {
                if mask.get(x, y) {
                    assert!((19..=40).contains(&x) && (29..=36).contains(&y), "({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn speck_is_opened_away() {
        let extractor = InkExtractor::new(InkConfig::default());
        let mut board = RgbImage::from_pixel(60, 60, BOARD);
        board.put_pixel(30, 30, Rgb([0, 0, 0]));
        assert!(!extractor.detect_ink(&board).any());
    }

    #[test]
    fn colors_come_from_unoccluded_samples_only() {
        let (w, h) = (8, 8);
        let ink = Mask::from_fn(w, h, |x, y| x == 3 && y == 3);

        let mut window = TemporalWindow::new(5, 1);
        window.append(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])), Mask::new(w, h));
        window.append(
            RgbImage::from_pixel(w, h, Rgb([200, 200, 200])),
            Mask::from_fn(w, h, |_, _| true),
        );
        window.append(RgbImage::from_pixel(w, h, Rgb([14, 22, 34])), Mask::new(w, h));
        window.append(RgbImage::from_pixel(w, h, Rgb([12, 24, 32])), Mask::new(w, h));

        let colors = InkExtractor::new(InkConfig::default()).recover_colors(&window, &ink);
        assert_eq!(colors.get_pixel(3, 3), &Rgb([12, 22, 32]));
        assert_eq!(colors.get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn ink_never_seen_unoccluded_defaults_to_white() {
        let (w, h) = (4, 4);
        let ink = Mask::from_fn(w, h, |_, _| true);
        let mut window = TemporalWindow::new(2, 1);
        window.append(
            RgbImage::from_pixel(w, h, Rgb([0, 0, 0])),
            Mask::from_fn(w, h, |_, _| true),
        );

        let colors = InkExtractor::new(InkConfig::default()).recover_colors(&window, &ink);
        assert_eq!(colors.get_pixel(1, 1), &WHITE);
    }
}
