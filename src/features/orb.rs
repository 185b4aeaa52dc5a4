//! Oriented FAST keypoints with rotated binary descriptors.
//!
//! Single-scale ORB: FAST-9 corners ranked by their arc contrast, oriented by
//! the intensity centroid of a disk patch, described by 256 pairwise
//! intensity tests on a Gaussian-smoothed image. The test pattern is drawn
//! once from a fixed seed.

use image::{imageops, GrayImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PATTERN_SEED: u64 = 0x0B1E_C7ED;
const DESCRIPTOR_BITS: usize = 256;
/// Test points lie within this half-width of the keypoint.
const PATTERN_HALF: i32 = 12;
/// Orientation patch radius.
const PATCH_RADIUS: i32 = 15;
/// Keypoints closer than this to the border are discarded so that rotated
/// tests stay in bounds.
const BORDER: u32 = 19;
const SMOOTHING_SIGMA: f32 = 2.0;

/// Bresenham circle of radius 3 used by the FAST test.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];
const ARC_LENGTH: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
}

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    #[inline]
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints with their descriptors, index-aligned.
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

pub struct OrbDetector {
    max_features: usize,
    fast_threshold: u8,
    pattern: Vec<[(i32, i32); 2]>,
}

impl OrbDetector {
    pub fn new(max_features: usize, fast_threshold: u8) -> Self {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut point = || {
            (
                rng.gen_range(-PATTERN_HALF..=PATTERN_HALF),
                rng.gen_range(-PATTERN_HALF..=PATTERN_HALF),
            )
        };
        let pattern = (0..DESCRIPTOR_BITS).map(|_| [point(), point()]).collect();

        Self {
            max_features,
            fast_threshold,
            pattern,
        }
    }

    /// Detect up to `max_features` keypoints and describe them.
    pub fn detect_and_compute(&self, gray: &GrayImage) -> FeatureSet {
        let _span = tracing::debug_span!("orb_detect").entered();

        let (w, h) = gray.dimensions();
        if w <= 2 * BORDER || h <= 2 * BORDER || self.max_features == 0 {
            return FeatureSet::default();
        }

        let mut corners = self.fast_corners(gray);
        corners.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then_with(|| a.y.total_cmp(&b.y))
                .then_with(|| a.x.total_cmp(&b.x))
        });
        corners.truncate(self.max_features);

        for kp in &mut corners {
            kp.angle = intensity_centroid_angle(gray, kp.x as i32, kp.y as i32);
        }

        let smoothed = imageops::blur(gray, SMOOTHING_SIGMA);
        let descriptors = corners
            .iter()
            .map(|kp| self.describe(&smoothed, kp))
            .collect();

        FeatureSet {
            keypoints: corners,
            descriptors,
        }
    }

    /// FAST-9 with 3x3 non-maximum suppression on the arc score.
    fn fast_corners(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = gray.dimensions();
        let stride = w as usize;
        let data = gray.as_raw();
        let t = self.fast_threshold as i32;
        let mut scores = vec![0i32; data.len()];

        for y in BORDER..h - BORDER {
            for x in BORDER..w - BORDER {
                let idx = y as usize * stride + x as usize;
                let center = data[idx] as i32;
                let ring: [i32; 16] = CIRCLE.map(|(dx, dy)| {
                    data[(y as i32 + dy) as usize * stride + (x as i32 + dx) as usize] as i32
                });

                // Any 9-arc covers at least two of the four compass points.
                let compass = [ring[0], ring[4], ring[8], ring[12]];
                let bright = compass.iter().filter(|&&v| v > center + t).count();
                let dark = compass.iter().filter(|&&v| v < center - t).count();
                if bright < 2 && dark < 2 {
                    continue;
                }

                let score = arc_score(&ring, center, t);
                if score > 0 {
                    scores[idx] = score;
                }
            }
        }

        let mut keypoints = Vec::new();
        for y in BORDER..h - BORDER {
            for x in BORDER..w - BORDER {
                let idx = y as usize * stride + x as usize;
                let s = scores[idx];
                if s == 0 {
                    continue;
                }
                let mut is_max = true;
                'nms: for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nidx = (y as i32 + dy) as usize * stride + (x as i32 + dx) as usize;
                        let ns = scores[nidx];
                        // Ties go to the earlier pixel in raster order.
                        if ns > s || (ns == s && (dy < 0 || (dy == 0 && dx < 0))) {
                            is_max = false;
                            break 'nms;
                        }
                    }
                }
                if is_max {
                    keypoints.push(Keypoint {
                        x: x as f32,
                        y: y as f32,
                        angle: 0.0,
                        response: s as f32,
                    });
                }
            }
        }
        keypoints
    }

    fn describe(&self, smoothed: &GrayImage, kp: &Keypoint) -> Descriptor {
        let (sin, cos) = kp.angle.sin_cos();
        let cx = kp.x as i32;
        let cy = kp.y as i32;
        let (w, h) = smoothed.dimensions();

        let sample = |(px, py): (i32, i32)| -> u8 {
            let rx = (px as f32 * cos - py as f32 * sin).round() as i32;
            let ry = (px as f32 * sin + py as f32 * cos).round() as i32;
            let x = (cx + rx).clamp(0, w as i32 - 1) as u32;
            let y = (cy + ry).clamp(0, h as i32 - 1) as u32;
            smoothed.get_pixel(x, y)[0]
        };

        let mut bits = [0u64; 4];
        for (i, [a, b]) in self.pattern.iter().enumerate() {
            if sample(*a) < sample(*b) {
                bits[i / 64] |= 1 << (i % 64);
            }
        }
        Descriptor(bits)
    }
}

/// Sum of contrast over the best contiguous 9-arc, or 0 if there is none.
fn arc_score(ring: &[i32; 16], center: i32, t: i32) -> i32 {
    let mut best = 0;
    for sign in [1i32, -1] {
        let mut run = 0usize;
        let mut run_sum = 0i32;
        // Walk the ring twice to catch arcs wrapping past index 0.
        for i in 0..32 {
            let diff = (ring[i % 16] - center) * sign - t;
            if diff > 0 {
                run += 1;
                run_sum += diff;
                if run >= ARC_LENGTH {
                    best = best.max(run_sum);
                }
                if run >= 16 {
                    break;
                }
            } else {
                run = 0;
                run_sum = 0;
            }
        }
    }
    best
}

/// Orientation from the intensity centroid over a disk around (x, y).
fn intensity_centroid_angle(gray: &GrayImage, x: i32, y: i32) -> f32 {
    let (w, h) = gray.dimensions();
    let mut m01 = 0f64;
    let mut m10 = 0f64;
    let r2 = PATCH_RADIUS * PATCH_RADIUS;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let px = x + dx;
            let py = y + dy;
            if px < 0 || py < 0 || px >= w as i32 || py >= h as i32 {
                continue;
            }
            let v = gray.get_pixel(px as u32, py as u32)[0] as f64;
            m10 += dx as f64 * v;
            m01 += dy as f64 * v;
        }
    }
    m01.atan2(m10) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic blocky texture with plenty of corners.
    fn checker(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let cell = (x / 12 + (y / 12) * 3 + (x / 29) * (y / 17)) % 4;
            Luma([[20, 90, 170, 240][cell as usize]])
        })
    }

    #[test]
    fn flat_image_has_no_features() {
        let orb = OrbDetector::new(500, 20);
        let img = GrayImage::from_pixel(120, 100, Luma([255]));
        assert!(orb.detect_and_compute(&img).is_empty());
    }

    #[test]
    fn square_corners_are_detected() {
        let orb = OrbDetector::new(500, 20);
        let img = GrayImage::from_fn(120, 120, |x, y| {
            let inside = (40..80).contains(&x) && (40..80).contains(&y);
            Luma([if inside { 30 } else { 230 }])
        });
        let features = orb.detect_and_compute(&img);

        assert!(features.len() >= 4, "found {}", features.len());
        for corner in [(40.0, 40.0), (79.0, 40.0), (40.0, 79.0), (79.0, 79.0)] {
            let near = features
                .keypoints
                .iter()
                .any(|kp| (kp.x - corner.0).abs() <= 2.0 && (kp.y - corner.1).abs() <= 2.0);
            assert!(near, "no keypoint near {corner:?}");
        }
    }

    #[test]
    fn respects_feature_cap_and_descriptor_alignment() {
        let orb = OrbDetector::new(25, 20);
        let features = orb.detect_and_compute(&checker(200, 160));
        assert!(features.len() <= 25);
        assert_eq!(features.keypoints.len(), features.descriptors.len());
    }

    #[test]
    fn detection_is_deterministic() {
        let a = OrbDetector::new(300, 20).detect_and_compute(&checker(160, 140));
        let b = OrbDetector::new(300, 20).detect_and_compute(&checker(160, 140));
        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = Descriptor([0, 0, 0, 0]);
        let b = Descriptor([0b1011, 0, 1 << 63, 0]);
        assert_eq!(a.hamming(&b), 4);
        assert_eq!(b.hamming(&b), 0);
    }

    #[test]
    fn arc_score_requires_nine_contiguous() {
        let mut ring = [100i32; 16];
        for v in ring.iter_mut().take(8) {
            *v = 200;
        }
        assert_eq!(arc_score(&ring, 100, 20), 0);

        // Wrap-around arc of nine.
        let mut ring = [100i32; 16];
        for i in [12, 13, 14, 15, 0, 1, 2, 3, 4] {
            ring[i] = 10;
        }
        assert_eq!(arc_score(&ring, 100, 20), 9 * 70);
    }
}
