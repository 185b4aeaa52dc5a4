//! Presenter-free whiteboard capture.
//!
//! A [`Session`] localizes the board in its first frame, then aligns,
//! masks and buffers every later frame, fusing the window into a clean
//! canvas once enough frames have arrived. [`SessionRegistry`] keeps one
//! session per room.

pub mod capture;
pub mod config;
pub mod error;
pub mod features;
pub mod frame;
pub mod imgproc;
pub mod output;
pub mod pipeline;
pub mod rooms;
pub mod segmentation;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use frame::{decode_frame, Frame, Region};
pub use pipeline::{FrameOutcome, Session, SessionState};
pub use rooms::SessionRegistry;
pub use segmentation::{Segment, SegmentationModel};
