mod directory;
#[cfg(feature = "webcam")]
mod loopback;

pub use directory::PngDirectory;
#[cfg(feature = "webcam")]
pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution, if the sink has a fixed one
    fn resolution(&self) -> Option<(u32, u32)>;
}
