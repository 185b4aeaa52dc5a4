use image::{Rgb, RgbImage};

use super::window::TemporalWindow;
use crate::config::BackgroundConfig;
use crate::imgproc::{inpaint_telea, Mask};

/// Median of `values`, `None` when empty. For an even count this is the
/// floor of the mean of the two middle values.
pub fn median_u8(values: &mut [u8]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(((values[mid - 1] as u16 + values[mid] as u16) / 2) as u8)
    }
}

/// Fuses the window into a presenter-free background.
pub struct BackgroundEstimator {
    config: BackgroundConfig,
}

impl BackgroundEstimator {
    pub fn new(config: BackgroundConfig) -> Self {
        Self { config }
    }

    /// Per-pixel temporal median over unoccluded samples. Pixels occluded in
    /// every frame are inpainted from their surroundings.
    ///
    /// The window must be non-empty and hold frames of one size.
    pub fn estimate(&self, window: &TemporalWindow) -> RgbImage {
        let _span = tracing::debug_span!("background", frames = window.len()).entered();

        let Some(first) = window.iter().next() else {
            return RgbImage::new(0, 0);
        };
        let (width, height) = first.frame.dimensions();

        let mut background = RgbImage::new(width, height);
        let mut unknown = Mask::new(width, height);
        let mut samples: [Vec<u8>; 3] = Default::default();

        for y in 0..height {
            for x in 0..width {
                for channel in samples.iter_mut() {
                    channel.clear();
                }
                for entry in window.iter() {
                    if entry.occupancy.get(x, y) {
                        continue;
                    }
                    let p = entry.frame.get_pixel(x, y);
                    for (c, channel) in samples.iter_mut().enumerate() {
                        channel.push(p[c]);
                    }
                }

                let [r, g, b] = &mut samples;
                match (median_u8(r), median_u8(g), median_u8(b)) {
                    (Some(r), Some(g), Some(b)) => background.put_pixel(x, y, Rgb([r, g, b])),
                    _ => {
                        background.put_pixel(x, y, Rgb([255, 255, 255]));
                        unknown.set(x, y, true);
                    }
                }
            }
        }

        if unknown.any() {
            tracing::debug!(pixels = unknown.count(), "inpainting always-occluded pixels");
            background = inpaint_telea(&background, &unknown, self.config.inpaint_radius);
        }
        background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(frames: &[(RgbImage, Mask)]) -> TemporalWindow {
        let mut window = TemporalWindow::new(frames.len(), 1);
        for (f, m) in frames {
            window.append(f.clone(), m.clone());
        }
        window
    }

    #[test]
    fn median_conventions() {
        assert_eq!(median_u8(&mut []), None);
        assert_eq!(median_u8(&mut [9, 1, 5]), Some(5));
        assert_eq!(median_u8(&mut [10, 20]), Some(15));
        assert_eq!(median_u8(&mut [10, 13]), Some(11));
        assert_eq!(median_u8(&mut [255, 254, 0, 1]), Some(127));
    }

    #[test]
    fn occluded_samples_are_ignored() {
        let w = 4;
        let h = 3;
        let values = [10u8, 200, 30, 40, 250];
        let occluded = [false, true, false, false, true];
        let frames: Vec<_> = values
            .iter()
            .zip(occluded)
            .map(|(&v, occ)| {
                (
                    RgbImage::from_pixel(w, h, Rgb([v, v / 2, 255 - v])),
                    Mask::from_fn(w, h, |_, _| occ),
                )
            })
            .collect();

        let background = BackgroundEstimator::new(BackgroundConfig::default())
            .estimate(&window_of(&frames));
        // Unoccluded: 10, 30, 40.
        assert_eq!(background.get_pixel(2, 1), &Rgb([30, 15, 225]));
    }

    #[test]
    fn even_count_uses_floor_of_mean() {
        let frames = [
            (RgbImage::from_pixel(3, 3, Rgb([100, 7, 0])), Mask::new(3, 3)),
            (RgbImage::from_pixel(3, 3, Rgb([103, 8, 1])), Mask::new(3, 3)),
        ];
        let background = BackgroundEstimator::new(BackgroundConfig::default())
            .estimate(&window_of(&frames));
        assert_eq!(background.get_pixel(1, 1), &Rgb([101, 7, 0]));
    }

    #[test]
    fn always_occluded_pixels_are_inpainted() {
        let (w, h) = (30, 30);
        let board = Rgb([180, 190, 200]);
        let hole = Mask::from_fn(w, h, |x, y| (12..18).contains(&x) && (12..18).contains(&y));
        let frames: Vec<_> = (0..5)
            .map(|_| {
                let mut frame = RgbImage::from_pixel(w, h, board);
                // The occluder itself is dark; it must not leak into the result.
                for y in 12..18 {
                    for x in 12..18 {
                        frame.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
                (frame, hole.clone())
            })
            .collect();

        let background = BackgroundEstimator::new(BackgroundConfig::default())
            .estimate(&window_of(&frames));
        for y in 12..18 {
            for x in 12..18 {
                let p = background.get_pixel(x, y);
                assert_ne!(p, &Rgb([255, 255, 255]), "sentinel left at ({x}, {y})");
                for c in 0..3 {
                    assert!((p[c] as i32 - board[c] as i32).abs() <= 2, "({x}, {y}) = {p:?}");
                }
            }
        }
        assert_eq!(background.get_pixel(0, 0), &board);
    }
}
