//! Whiteboard reconstruction: localize once, then align, mask, buffer and
//! fuse every incoming frame.

pub mod aligner;
pub mod background;
pub mod compositor;
pub mod ink;
pub mod localizer;
pub mod occupancy;
pub mod session;
pub mod window;

pub use aligner::{AlignOutcome, Aligned, FrameAligner, ReferenceDescriptor};
pub use background::BackgroundEstimator;
pub use compositor::composite;
pub use ink::{InkExtractor, InkLayer};
pub use localizer::WhiteboardLocalizer;
pub use occupancy::{Occupancy, OccupancyDetector};
pub use session::{FrameOutcome, Session, SessionState};
pub use window::{TemporalWindow, WindowEntry};
