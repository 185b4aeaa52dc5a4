use image::RgbImage;

use crate::config::LocalizerConfig;
use crate::error::PipelineError;
use crate::frame::Region;
use crate::imgproc::{bilateral_filter, external_contours, morph, threshold, to_gray};
use crate::imgproc::StructuringElement;

/// Finds the board as the largest bright blob of a clean frame.
pub struct WhiteboardLocalizer {
    config: LocalizerConfig,
}

impl WhiteboardLocalizer {
    pub fn new(config: LocalizerConfig) -> Self {
        Self { config }
    }

    /// Bounding box of the largest bright region whose contour area exceeds
    /// `min_area`.
    pub fn locate(&self, frame: &RgbImage) -> Result<Region, PipelineError> {
        let _span = tracing::debug_span!("localize").entered();
        let cfg = &self.config;

        let gray = bilateral_filter(
            &to_gray(frame),
            cfg.bilateral_diameter,
            cfg.bilateral_sigma_color,
            cfg.bilateral_sigma_space,
        );
        let bright = threshold::binary(&gray, cfg.threshold);
        let closed = morph::close(
            &bright,
            &StructuringElement::rect(cfg.close_kernel, cfg.close_kernel),
        );

        let contours = external_contours(&closed);
        let min_area = cfg.min_area as f64;
        let largest = contours
            .iter()
            .map(|c| (c, c.area()))
            .filter(|(_, area)| *area > min_area)
            .fold(None, |best: Option<(_, f64)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });

        let Some((contour, area)) = largest else {
            tracing::debug!(candidates = contours.len(), "no contour above area floor");
            return Err(PipelineError::NoWhiteboardFound {
                min_area: cfg.min_area,
            });
        };

        let region = contour.bounding_rect();
        tracing::info!("Whiteboard detected: {} (contour area {:.0})", region, area);
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn board_frame(w: u32, h: u32, board: Region) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let inside = x >= board.x
                && x < board.x + board.width
                && y >= board.y
                && y < board.y + board.height;
            if inside {
                Rgb([250, 250, 250])
            } else {
                Rgb([60, 55, 50])
            }
        })
    }

    #[test]
    fn finds_bright_board_on_dark_wall() {
        let board = Region::new(10, 10, 120, 100);
        let frame = board_frame(160, 140, board);
        let localizer = WhiteboardLocalizer::new(LocalizerConfig::default());

        assert_eq!(localizer.locate(&frame).unwrap(), board);
    }

    #[test]
    fn all_white_frame_is_the_board() {
        let frame = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        let localizer = WhiteboardLocalizer::new(LocalizerConfig::default());

        assert_eq!(
            localizer.locate(&frame).unwrap(),
            Region::new(0, 0, 400, 300)
        );
    }

    #[test]
    fn picks_the_largest_candidate() {
        let mut frame = board_frame(300, 200, Region::new(150, 20, 140, 160));
        for y in 20..140 {
            for x in 10..130 {
                frame.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        let localizer = WhiteboardLocalizer::new(LocalizerConfig::default());

        assert_eq!(
            localizer.locate(&frame).unwrap(),
            Region::new(150, 20, 140, 160)
        );
    }

    #[test]
    fn small_bright_patch_is_rejected() {
        let frame = board_frame(200, 200, Region::new(50, 50, 60, 60));
        let localizer = WhiteboardLocalizer::new(LocalizerConfig::default());

        assert!(matches!(
            localizer.locate(&frame),
            Err(PipelineError::NoWhiteboardFound { min_area: 10_000 })
        ));
    }

    #[test]
    fn dark_frame_has_no_board() {
        let frame = RgbImage::from_pixel(200, 150, Rgb([40, 40, 40]));
        let localizer = WhiteboardLocalizer::new(LocalizerConfig::default());
        assert!(localizer.locate(&frame).is_err());
    }
}
