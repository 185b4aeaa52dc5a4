use image::RgbImage;
use nalgebra::Point2;

use crate::config::AlignerConfig;
use crate::features::{
    find_homography_ransac, match_cross_check, FeatureSet, OrbDetector, RansacParams,
};
use crate::imgproc::{to_gray, warp_perspective_rgb};

/// Keypoints and descriptors of the cropped reference frame.
#[derive(Clone, Debug)]
pub struct ReferenceDescriptor {
    features: FeatureSet,
    size: (u32, u32),
}

impl ReferenceDescriptor {
    pub fn keypoint_count(&self) -> usize {
        self.features.len()
    }

    /// Size of the reference crop, which is also the aligned output size.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// What the aligner did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignOutcome {
    /// Warped onto the reference grid.
    Warped { matches: usize, inliers: usize },
    /// Returned unchanged: the reference has no usable features.
    NoReference,
    TooFewKeypoints(usize),
    TooFewMatches(usize),
    HomographyFailed,
}

impl AlignOutcome {
    pub fn is_warped(&self) -> bool {
        matches!(self, AlignOutcome::Warped { .. })
    }
}

pub struct Aligned {
    pub frame: RgbImage,
    pub outcome: AlignOutcome,
}

/// Registers cropped frames onto the reference crop with a per-frame homography.
pub struct FrameAligner {
    detector: OrbDetector,
    config: AlignerConfig,
}

impl FrameAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            detector: OrbDetector::new(config.max_features, config.fast_threshold),
            config,
        }
    }

    pub fn describe(&self, reference: &RgbImage) -> ReferenceDescriptor {
        let _span = tracing::debug_span!("describe_reference").entered();
        ReferenceDescriptor {
            features: self.detector.detect_and_compute(&to_gray(reference)),
            size: reference.dimensions(),
        }
    }

    /// Warp `frame` onto the reference grid at `target` size.
    ///
    /// Never fails: when registration is not possible the input comes back
    /// untouched and the outcome says why.
    pub fn align(
        &self,
        frame: RgbImage,
        reference: &ReferenceDescriptor,
        target: (u32, u32),
    ) -> Aligned {
        let _span = tracing::debug_span!("align").entered();
        let unchanged = |frame, outcome| {
            tracing::debug!(?outcome, "alignment skipped");
            Aligned { frame, outcome }
        };

        if reference.features.is_empty() {
            return unchanged(frame, AlignOutcome::NoReference);
        }

        let features = self.detector.detect_and_compute(&to_gray(&frame));
        if features.len() < 4 {
            return unchanged(frame, AlignOutcome::TooFewKeypoints(features.len()));
        }

        // Reference descriptors are the query side.
        let mut matches = match_cross_check(&reference.features.descriptors, &features.descriptors);
        matches.truncate(self.config.keep_best_matches);
        if matches.len() < self.config.min_match_count.max(4) {
            return unchanged(frame, AlignOutcome::TooFewMatches(matches.len()));
        }

        let (frame_pts, reference_pts): (Vec<_>, Vec<_>) = matches
            .iter()
            .map(|m| {
                let r = &reference.features.keypoints[m.query_idx];
                let f = &features.keypoints[m.train_idx];
                (Point2::new(f.x, f.y), Point2::new(r.x, r.y))
            })
            .unzip();

        let params = RansacParams {
            threshold: self.config.ransac_threshold,
            max_iterations: self.config.ransac_max_iterations,
            confidence: self.config.ransac_confidence,
        };
        let Some(fit) = find_homography_ransac(&frame_pts, &reference_pts, params) else {
            tracing::warn!(matches = matches.len(), "homography estimation failed");
            return unchanged(frame, AlignOutcome::HomographyFailed);
        };

        match warp_perspective_rgb(&frame, &fit.homography, target.0, target.1) {
            Some(warped) => {
                let outcome = AlignOutcome::Warped {
                    matches: matches.len(),
                    inliers: fit.inlier_count(),
                };
                tracing::debug!(?outcome, "frame aligned");
                Aligned {
                    frame: warped,
                    outcome,
                }
            }
            None => {
                tracing::warn!("estimated homography is singular");
                unchanged(frame, AlignOutcome::HomographyFailed)
            }
        }
    }
}
