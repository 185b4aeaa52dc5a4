use anyhow::Result;
use image::RgbImage;
use ndarray::Array2;

/// One labelled region returned by a segmentation model.
#[derive(Clone, Debug)]
pub struct Segment {
    /// Class name, e.g. "person".
    pub label: String,
    pub confidence: f32,
    /// Soft mask with values 0.0-1.0, shape `[height, width]`.
    ///
    /// Covers the whole input frame, usually at the model's own resolution.
    pub mask: Array2<f32>,
}

/// Trait for segmentation models
/// Allows swapping between different backends (YOLOv8-seg, RVM, ...)
pub trait SegmentationModel: Send {
    /// Segment a frame into labelled regions
    ///
    /// # Arguments
    /// * `frame` - Input RGB frame
    /// * `min_confidence` - Regions scoring below this are dropped
    fn detect(&mut self, frame: &RgbImage, min_confidence: f32) -> Result<Vec<Segment>>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Starting a new session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
