//! Local features and planar geometry used to register frames.

pub mod homography;
pub mod matcher;
pub mod orb;

pub use homography::{find_homography_ransac, Homography, RansacFit, RansacParams};
pub use matcher::{match_cross_check, DescriptorMatch};
pub use orb::{Descriptor, FeatureSet, Keypoint, OrbDetector};
