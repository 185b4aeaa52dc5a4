use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Fixed seed so alignment is reproducible frame to frame.
const RANSAC_SEED: u64 = 0x5EED_B0A4D;
/// Lower bound on the adaptive iteration budget.
const MIN_ITERATIONS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Least-squares H with `dst ~ H * src` (normalized DLT).
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src.try_into().ok()?;
        let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // h is the right singular vector with the smallest singular value
    let svd = a.svd(true, true);
    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);
    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Exact H with `dst ~ H * src` from four correspondences.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    // Unknowns [h11 h12 h13 h21 h22 h23 h31 h32], h33 = 1
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Result of a robust fit.
#[derive(Clone, Debug)]
pub struct RansacFit {
    pub homography: Homography,
    pub inliers: Vec<bool>,
}

impl RansacFit {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&v| v).count()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RansacParams {
    /// Maximum reprojection error (px) for a correspondence to count as inlier.
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
        }
    }
}

/// RANSAC over minimal 4-point samples, refined by DLT on the best consensus set.
///
/// Sampling is seeded, so identical inputs always give identical output.
pub fn find_homography_ransac(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    params: RansacParams,
) -> Option<RansacFit> {
    let n = src.len();
    if n != dst.len() || n < 4 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let threshold2 = params.threshold * params.threshold;
    let mut best: Option<(Homography, usize)> = None;
    let mut budget = params.max_iterations.max(1);
    let mut iteration = 0;

    while iteration < budget {
        iteration += 1;

        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let s = [
            src[sample.index(0)],
            src[sample.index(1)],
            src[sample.index(2)],
            src[sample.index(3)],
        ];
        let d = [
            dst[sample.index(0)],
            dst[sample.index(1)],
            dst[sample.index(2)],
            dst[sample.index(3)],
        ];
        if is_degenerate(&s) || is_degenerate(&d) {
            continue;
        }
        let Some(h) = homography_from_4pt(&s, &d) else {
            continue;
        };

        let count = count_inliers(&h, src, dst, threshold2);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((h, count));
            budget = budget
                .min(adaptive_iterations(count, n, params.confidence).max(MIN_ITERATIONS));
        }
    }

    let (h, count) = best?;
    if count < 4 {
        return None;
    }

    let mask = inlier_mask(&h, src, dst, threshold2);
    let (in_src, in_dst): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .zip(&mask)
        .filter(|(_, &keep)| keep)
        .map(|((s, d), _)| (*s, *d))
        .unzip();

    let refined = estimate_homography(&in_src, &in_dst)
        .filter(|r| count_inliers(r, src, dst, threshold2) >= count)
        .unwrap_or(h);
    let inliers = inlier_mask(&refined, src, dst, threshold2);

    Some(RansacFit {
        homography: refined,
        inliers,
    })
}

fn reprojection_error2(h: &Homography, s: Point2<f32>, d: Point2<f32>) -> f64 {
    let p = h.apply(s);
    let dx = (p.x - d.x) as f64;
    let dy = (p.y - d.y) as f64;
    let e = dx * dx + dy * dy;
    if e.is_finite() {
        e
    } else {
        f64::INFINITY
    }
}

fn count_inliers(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold2: f64,
) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| reprojection_error2(h, **s, **d) <= threshold2)
        .count()
}

fn inlier_mask(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold2: f64,
) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error2(h, *s, *d) <= threshold2)
        .collect()
}

fn adaptive_iterations(inliers: usize, total: usize, confidence: f64) -> usize {
    let ratio = inliers as f64 / total as f64;
    let p_good = ratio.powi(4);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return usize::MAX;
    }
    let k = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if k.is_finite() && k >= 0.0 {
        k.ceil() as usize
    } else {
        usize::MAX
    }
}

/// True when any three of the four points are (nearly) collinear.
fn is_degenerate(pts: &[Point2<f32>; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let cross =
            (b.x - a.x) as f64 * (c.y - a.y) as f64 - (b.y - a.y) as f64 * (c.x - a.x) as f64;
        cross.abs() < 1e-3
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            1.02, 0.03, 4.0, //
            -0.02, 0.98, -3.0, //
            0.0001, -0.00005, 1.0,
        ))
    }

    fn grid_points() -> Vec<Point2<f32>> {
        (0..6)
            .flat_map(|y| {
                (0..8).map(move |x| Point2::new(x as f32 * 37.0 + 5.0, y as f32 * 41.0 + 3.0))
            })
            .collect()
    }

    #[test]
    fn four_point_solution_is_exact() {
        let gt = ground_truth();
        let src = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(200.0, 0.0),
            Point2::new(200.0, 150.0),
            Point2::new(0.0, 150.0),
        ];
        let dst = src.map(|p| gt.apply(p));
        let h = homography_from_4pt(&src, &dst).expect("solvable");

        for p in [Point2::new(10.0_f32, 20.0), Point2::new(180.0, 90.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-3);
        }
    }

    #[test]
    fn dlt_recovers_overdetermined_fit() {
        let gt = ground_truth();
        let src = grid_points();
        let dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();
        let h = estimate_homography(&src, &dst).expect("estimate");

        for p in [Point2::new(0.0_f32, 0.0), Point2::new(120.0, 77.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-2);
        }
    }

    #[test]
    fn ransac_rejects_outliers() {
        let gt = ground_truth();
        let src = grid_points();
        let mut dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();
        // Corrupt a quarter of the correspondences.
        for (i, d) in dst.iter_mut().enumerate() {
            if i % 4 == 1 {
                *d = Point2::new(d.x + 60.0 + i as f32, d.y - 45.0);
            }
        }

        let fit = find_homography_ransac(&src, &dst, RansacParams::default()).expect("fit");
        assert_eq!(fit.inlier_count(), src.len() - src.len() / 4);
        for (i, &inlier) in fit.inliers.iter().enumerate() {
            assert_eq!(inlier, i % 4 != 1, "correspondence {i}");
        }
        assert_close(
            fit.homography.apply(Point2::new(100.0, 100.0)),
            gt.apply(Point2::new(100.0, 100.0)),
            0.05,
        );
    }

    #[test]
    fn ransac_is_deterministic() {
        let gt = ground_truth();
        let src = grid_points();
        let mut dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();
        dst[3].x += 40.0;

        let a = find_homography_ransac(&src, &dst, RansacParams::default()).unwrap();
        let b = find_homography_ransac(&src, &dst, RansacParams::default()).unwrap();
        assert_eq!(a.homography, b.homography);
        assert_eq!(a.inliers, b.inliers);
    }

    #[test]
    fn collinear_points_have_no_fit() {
        let src: Vec<_> = (0..10).map(|i| Point2::new(i as f32 * 10.0, 5.0)).collect();
        let dst = src.clone();
        assert!(find_homography_ransac(&src, &dst, RansacParams::default()).is_none());
    }

    #[test]
    fn too_few_points_fail() {
        let pts = [Point2::new(0.0_f32, 0.0); 3];
        assert!(estimate_homography(&pts, &pts).is_none());
        assert!(find_homography_ransac(&pts, &pts, RansacParams::default()).is_none());
    }
}
