use std::sync::Arc;

use image::RgbImage;

use super::aligner::{FrameAligner, ReferenceDescriptor};
use super::background::BackgroundEstimator;
use super::compositor::composite;
use super::ink::{InkExtractor, InkLayer};
use super::localizer::WhiteboardLocalizer;
use super::occupancy::OccupancyDetector;
use super::window::TemporalWindow;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::frame::{decode_frame, Frame, Region};
use crate::imgproc::Mask;
use crate::segmentation::SegmentationModel;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No reference frame yet.
    Empty,
    /// Region and reference descriptors known, window empty.
    ReferenceSet,
    /// Window holds fewer than `min_batch` frames.
    Buffering,
    /// A canvas is published and refreshed on every qualifying frame.
    Steady,
}

/// Result of one successful `submit_frame`.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    ReferenceEstablished { region: Region, keypoints: usize },
    /// The frame was discarded without touching the window.
    NoPerson {
        person_pixels: usize,
        min_pixels: usize,
    },
    Buffering { count: usize, needed: usize },
    Processed {
        canvas: Arc<RgbImage>,
        window_len: usize,
    },
}

struct Reference {
    region: Region,
    frame_size: (u32, u32),
    descriptor: ReferenceDescriptor,
}

/// Everything derived from one window snapshot.
struct Fusion {
    background: RgbImage,
    ink: InkLayer,
    canvas: Arc<RgbImage>,
}

/// Per-room processing pipeline.
///
/// Single-writer: callers serialize `submit_frame` and `reset`. Any error
/// leaves the session exactly as it was before the call.
pub struct Session {
    localizer: WhiteboardLocalizer,
    aligner: FrameAligner,
    occupancy: OccupancyDetector,
    background: BackgroundEstimator,
    ink: InkExtractor,
    window: TemporalWindow,
    reference: Option<Reference>,
    fusion: Option<Fusion>,
}

impl Session {
    pub fn new(config: PipelineConfig, model: Option<Box<dyn SegmentationModel>>) -> Self {
        Self {
            localizer: WhiteboardLocalizer::new(config.localizer),
            aligner: FrameAligner::new(config.aligner),
            occupancy: OccupancyDetector::new(model, config.occupancy),
            background: BackgroundEstimator::new(config.background),
            ink: InkExtractor::new(config.ink),
            window: TemporalWindow::new(config.window.capacity, config.window.min_batch),
            reference: None,
            fusion: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.reference.is_none() {
            SessionState::Empty
        } else if self.window.is_empty() {
            SessionState::ReferenceSet
        } else if !self.window.ready() {
            SessionState::Buffering
        } else {
            SessionState::Steady
        }
    }

    /// Decode an encoded image and submit it.
    pub fn submit_encoded(&mut self, bytes: &[u8]) -> Result<FrameOutcome, PipelineError> {
        let frame = decode_frame(bytes)?;
        self.submit_frame(frame)
    }

    /// Advance the pipeline by one frame.
    pub fn submit_frame(&mut self, frame: Frame) -> Result<FrameOutcome, PipelineError> {
        let _span = tracing::debug_span!("submit_frame", state = ?self.state()).entered();

        let Some(reference) = &self.reference else {
            return self.establish_reference(&frame);
        };

        if frame.dimensions() != reference.frame_size {
            return Err(PipelineError::FrameSizeMismatch {
                expected: reference.frame_size,
                actual: frame.dimensions(),
            });
        }

        let region = reference.region;
        let target = region.size();
        let aligned = self
            .aligner
            .align(region.crop(&frame), &reference.descriptor, target);
        if !aligned.outcome.is_warped() {
            tracing::debug!(outcome = ?aligned.outcome, "using unaligned crop");
        }

        let occupancy = self
            .occupancy
            .detect(&aligned.frame, target)
            .map_err(|err| {
                tracing::warn!("segmentation failed: {:#}", err);
                PipelineError::processing(err)
            })?;

        if !occupancy.has_person() {
            tracing::debug!(
                person_pixels = occupancy.person_pixels(),
                min_pixels = occupancy.min_pixels,
                "no person in frame, skipping"
            );
            return Ok(FrameOutcome::NoPerson {
                person_pixels: occupancy.person_pixels(),
                min_pixels: occupancy.min_pixels,
            });
        }

        self.push(aligned.frame, occupancy.mask);

        if !self.window.ready() {
            let (count, needed) = (self.window.len(), self.window.min_batch());
            tracing::info!("Buffering frames ({}/{})", count, needed);
            return Ok(FrameOutcome::Buffering { count, needed });
        }

        let canvas = self.fuse();
        Ok(FrameOutcome::Processed {
            canvas,
            window_len: self.window.len(),
        })
    }

    fn establish_reference(&mut self, frame: &Frame) -> Result<FrameOutcome, PipelineError> {
        let region = self.localizer.locate(frame)?;
        debug_assert!(region.fits_within(frame.width(), frame.height()));

        let descriptor = self.aligner.describe(&region.crop(frame));
        let keypoints = descriptor.keypoint_count();
        tracing::info!("Reference frame set with {} features", keypoints);

        self.reference = Some(Reference {
            region,
            frame_size: frame.dimensions(),
            descriptor,
        });
        Ok(FrameOutcome::ReferenceEstablished { region, keypoints })
    }

    fn push(&mut self, frame: RgbImage, occupancy: Mask) {
        let was_empty = self.window.is_empty();
        if self.window.append(frame, occupancy).is_some() {
            tracing::debug!("evicted oldest frame from window");
        }
        if was_empty {
            tracing::info!("First qualifying frame buffered");
        }
    }

    /// Recompute background, ink and canvas from the whole window.
    fn fuse(&mut self) -> Arc<RgbImage> {
        let _span = tracing::debug_span!("fuse", frames = self.window.len()).entered();
        if self.fusion.is_none() {
            tracing::info!("Window reached {} frames, publishing canvas", self.window.len());
        }

        let background = self.background.estimate(&self.window);
        let ink = self.ink.extract(&background, &self.window);
        let canvas = Arc::new(composite(&ink));

        self.fusion = Some(Fusion {
            background,
            ink,
            canvas: Arc::clone(&canvas),
        });
        canvas
    }

    /// Last published canvas, if any.
    pub fn current_canvas(&self) -> Option<Arc<RgbImage>> {
        self.fusion.as_ref().map(|f| Arc::clone(&f.canvas))
    }

    /// Back to `Empty`; the next frame is localized afresh.
    pub fn reset(&mut self) {
        self.reference = None;
        self.fusion = None;
        self.window.clear();
        self.occupancy.reset();
        tracing::info!("Session reset");
    }

    pub fn region(&self) -> Option<Region> {
        self.reference.as_ref().map(|r| r.region)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn background(&self) -> Option<&RgbImage> {
        self.fusion.as_ref().map(|f| &f.background)
    }

    pub fn ink_mask(&self) -> Option<&Mask> {
        self.fusion.as_ref().map(|f| &f.ink.mask)
    }

    pub fn stroke_color(&self) -> Option<&RgbImage> {
        self.fusion.as_ref().map(|f| &f.ink.stroke_color)
    }
}
