use anyhow::Result;
use image::RgbImage;

use crate::config::OccupancyConfig;
use crate::imgproc::{morph, Mask, StructuringElement};
use crate::segmentation::{resize_plane, Segment, SegmentationModel};

/// Presenter mask for an aligned frame, plus the presence decision.
#[derive(Clone, Debug)]
pub struct Occupancy {
    pub mask: Mask,
    /// Pixels that must be set for the frame to count as containing the presenter.
    pub min_pixels: usize,
}

impl Occupancy {
    pub fn person_pixels(&self) -> usize {
        self.mask.count()
    }

    pub fn has_person(&self) -> bool {
        self.person_pixels() >= self.min_pixels
    }
}

/// Wraps a segmentation model and turns its labelled regions into a
/// presenter mask.
pub struct OccupancyDetector {
    model: Option<Box<dyn SegmentationModel>>,
    config: OccupancyConfig,
}

impl OccupancyDetector {
    /// Without a model every mask is empty.
    pub fn new(model: Option<Box<dyn SegmentationModel>>, config: OccupancyConfig) -> Self {
        if model.is_none() {
            tracing::warn!("no segmentation model: every frame will report no person");
        }
        Self { model, config }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Smallest presenter area for a `width` x `height` frame.
    pub fn min_person_pixels(&self, width: u32, height: u32) -> usize {
        let total = width as f64 * height as f64;
        (self.config.min_person_area_ratio * total).floor() as usize
    }

    /// Presenter mask at `target` size.
    ///
    /// Only a backend error is reported; no detections give an all-false mask.
    pub fn detect(&mut self, frame: &RgbImage, target: (u32, u32)) -> Result<Occupancy> {
        let _span = tracing::debug_span!("occupancy").entered();
        let (width, height) = target;

        let mask = match self.model.as_mut() {
            Some(model) => {
                let segments = model.detect(frame, self.config.confidence)?;
                segments_to_mask(&segments, &self.config, width, height)
            }
            None => Mask::new(width, height),
        };

        let occupancy = Occupancy {
            min_pixels: self.min_person_pixels(width, height),
            mask,
        };
        tracing::debug!(
            person_pixels = occupancy.person_pixels(),
            min_pixels = occupancy.min_pixels,
            "occupancy computed"
        );
        Ok(occupancy)
    }

    /// Clear any temporal state in the model.
    pub fn reset(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.reset_state();
        }
    }
}

/// Union of the configured class's masks, resized and binarized, then closed.
pub fn segments_to_mask(
    segments: &[Segment],
    config: &OccupancyConfig,
    width: u32,
    height: u32,
) -> Mask {
    let mut mask = Mask::new(width, height);

    for segment in segments {
        if segment.label != config.person_label || segment.confidence < config.confidence {
            continue;
        }
        let plane = resize_plane(&segment.mask, width, height);
        let region = Mask::from_fn(width, height, |x, y| {
            plane[[y as usize, x as usize]] > config.mask_threshold
        });
        mask.union_with(&region);
    }

    if mask.any() {
        let kernel = StructuringElement::ellipse(config.close_kernel, config.close_kernel);
        mask = morph::close(&mask, &kernel);
    }
    mask
}
