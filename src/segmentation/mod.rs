mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;
pub mod yolo;

pub use preprocess::{resize_plane, Preprocessor};
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::{Segment, SegmentationModel};
#[cfg(feature = "onnx")]
pub use yolo::YoloSegmenter;

use anyhow::Result;
use std::path::Path;

/// Available segmentation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    /// YOLOv8 instance segmentation (class-labelled masks)
    Yolo,
    /// RobustVideoMatting (single person matte)
    Rvm,
}

/// Load a segmentation backend from an ONNX file.
#[cfg(feature = "onnx")]
pub fn create_model(kind: ModelKind, model_path: &Path) -> Result<Box<dyn SegmentationModel>> {
    let model: Box<dyn SegmentationModel> = match kind {
        ModelKind::Yolo => Box::new(YoloSegmenter::new(model_path)?),
        ModelKind::Rvm => Box::new(RobustVideoMatting::new(model_path)?),
    };
    tracing::info!(backend = model.name(), "segmentation model ready");
    Ok(model)
}

#[cfg(not(feature = "onnx"))]
pub fn create_model(kind: ModelKind, model_path: &Path) -> Result<Box<dyn SegmentationModel>> {
    anyhow::bail!(
        "cannot load {:?} model from {}: built without the `onnx` feature",
        kind,
        model_path.display()
    )
}
