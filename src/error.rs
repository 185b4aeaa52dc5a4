use thiserror::Error;

/// Failures surfaced by a processing session.
///
/// A frame without a presenter is not an error; see
/// [`FrameOutcome::NoPerson`](crate::pipeline::FrameOutcome::NoPerson).
/// Every error leaves the session exactly as it was before the call.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No bright region above the area floor was found in the reference frame.
    #[error("no whiteboard found (no bright region larger than {min_area} px)")]
    NoWhiteboardFound { min_area: u32 },

    /// The encoded input could not be turned into a pixel buffer.
    #[error("failed to decode frame: {0}")]
    DecodeFailure(String),

    /// The frame does not match the dimensions of the reference frame.
    #[error("frame is {}x{}, session expects {}x{}", actual.0, actual.1, expected.0, expected.1)]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Unexpected internal fault, e.g. the segmentation backend failing.
    #[error("processing failed: {0}")]
    ProcessingFailure(String),
}

impl PipelineError {
    /// Build a `ProcessingFailure` from any error, keeping its context chain.
    pub fn processing(err: anyhow::Error) -> Self {
        Self::ProcessingFailure(format!("{err:#}"))
    }
}
