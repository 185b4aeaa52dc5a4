//! Fast-marching inpainting (Telea 2004).
//!
//! Unknown pixels are filled in order of their distance from the known
//! region. Each one takes a weighted mean of already-known pixels within
//! `radius`, favouring close neighbours that lie along the marching
//! direction and on a similar distance level.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{Rgb, RgbImage};

use super::Mask;

const UNREACHED: f32 = 1.0e6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

#[derive(Clone, Copy, PartialEq)]
struct Narrow {
    t: f32,
    idx: usize,
}

impl Eq for Narrow {}

impl Ord for Narrow {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on arrival time, ties broken by raster order.
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Narrow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fill every pixel flagged in `unknown` from its known surroundings.
///
/// Pixels outside `unknown` are copied unchanged. If nothing is known the
/// image is returned as is.
pub fn inpaint_telea(image: &RgbImage, unknown: &Mask, radius: u32) -> RgbImage {
    let _span = tracing::debug_span!("inpaint", pixels = unknown.count()).entered();

    let (w, h) = image.dimensions();
    assert_eq!(unknown.dimensions(), (w, h), "inpaint mask size mismatch");

    let mut out = image.clone();
    if !unknown.any() || unknown.count() == unknown.len() {
        return out;
    }

    let width = w as i32;
    let height = h as i32;
    let index = |x: i32, y: i32| y as usize * w as usize + x as usize;
    let in_bounds = |x: i32, y: i32| x >= 0 && y >= 0 && x < width && y < height;

    let mut flags = vec![Flag::Known; unknown.len()];
    let mut times = vec![0f32; unknown.len()];
    for (i, &u) in unknown.as_slice().iter().enumerate() {
        if u {
            flags[i] = Flag::Inside;
            times[i] = UNREACHED;
        }
    }

    let mut heap = BinaryHeap::new();
    for y in 0..height {
        for x in 0..width {
            let idx = index(x, y);
            if flags[idx] != Flag::Known {
                continue;
            }
            let borders_hole = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                .iter()
                .any(|&(dx, dy)| {
                    in_bounds(x + dx, y + dy) && flags[index(x + dx, y + dy)] == Flag::Inside
                });
            if borders_hole {
                flags[idx] = Flag::Band;
                heap.push(Narrow { t: 0.0, idx });
            }
        }
    }

    let radius = radius.max(1) as i32;

    while let Some(Narrow { idx, .. }) = heap.pop() {
        if flags[idx] == Flag::Known {
            continue;
        }
        flags[idx] = Flag::Known;
        let px = (idx % w as usize) as i32;
        let py = (idx / w as usize) as i32;

        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let (qx, qy) = (px + dx, py + dy);
            if !in_bounds(qx, qy) {
                continue;
            }
            let qidx = index(qx, qy);
            if flags[qidx] == Flag::Known {
                continue;
            }

            let t = [(-1, -1), (1, -1), (-1, 1), (1, 1)]
                .iter()
                .map(|&(sx, sy)| {
                    solve_eikonal(
                        &flags,
                        &times,
                        (qx + sx, qy),
                        (qx, qy + sy),
                        in_bounds,
                        index,
                    )
                })
                .fold(UNREACHED, f32::min);

            if flags[qidx] == Flag::Inside {
                times[qidx] = t;
                let value = fill_pixel(&out, &flags, &times, (qx, qy), radius, in_bounds, index);
                if let Some(v) = value {
                    out.put_pixel(qx as u32, qy as u32, v);
                }
                flags[qidx] = Flag::Band;
                heap.push(Narrow { t, idx: qidx });
            } else if t < times[qidx] {
                times[qidx] = t;
                heap.push(Narrow { t, idx: qidx });
            }
        }
    }

    out
}

fn solve_eikonal(
    flags: &[Flag],
    times: &[f32],
    a: (i32, i32),
    b: (i32, i32),
    in_bounds: impl Fn(i32, i32) -> bool,
    index: impl Fn(i32, i32) -> usize,
) -> f32 {
    let time_of = |p: (i32, i32)| {
        if in_bounds(p.0, p.1) {
            let i = index(p.0, p.1);
            if flags[i] == Flag::Known {
                return Some(times[i]);
            }
        }
        None
    };

    match (time_of(a), time_of(b)) {
        (Some(t1), Some(t2)) => {
            let r = 2.0 - (t1 - t2) * (t1 - t2);
            if r > 0.0 {
                let s = r.sqrt();
                let sol = (t1 + t2 - s) / 2.0;
                if sol >= t1.max(t2) {
                    return sol;
                }
                let sol = (t1 + t2 + s) / 2.0;
                if sol >= t1.max(t2) {
                    return sol;
                }
            }
            1.0 + t1.min(t2)
        }
        (Some(t1), None) => 1.0 + t1,
        (None, Some(t2)) => 1.0 + t2,
        (None, None) => UNREACHED,
    }
}

fn fill_pixel(
    image: &RgbImage,
    flags: &[Flag],
    times: &[f32],
    p: (i32, i32),
    radius: i32,
    in_bounds: impl Fn(i32, i32) -> bool,
    index: impl Fn(i32, i32) -> usize,
) -> Option<Rgb<u8>> {
    let t_at = |x: i32, y: i32| -> Option<f32> {
        if in_bounds(x, y) && flags[index(x, y)] != Flag::Inside {
            Some(times[index(x, y)])
        } else {
            None
        }
    };

    let tp = times[index(p.0, p.1)];
    let grad = |lo: Option<f32>, hi: Option<f32>| match (lo, hi) {
        (Some(l), Some(h)) => (h - l) * 0.5,
        (None, Some(h)) => h - tp,
        (Some(l), None) => tp - l,
        (None, None) => 0.0,
    };
    let gx = grad(t_at(p.0 - 1, p.1), t_at(p.0 + 1, p.1));
    let gy = grad(t_at(p.0, p.1 - 1), t_at(p.0, p.1 + 1));

    let mut acc = [0f32; 3];
    let mut wsum = 0f32;
    let r2 = radius * radius;

    for ky in (p.1 - radius)..=(p.1 + radius) {
        for kx in (p.0 - radius)..=(p.0 + radius) {
            let rx = (p.0 - kx) as f32;
            let ry = (p.1 - ky) as f32;
            let d2 = (rx * rx + ry * ry) as i32;
            if d2 == 0 || d2 > r2 {
                continue;
            }
            let Some(tk) = t_at(kx, ky) else {
                continue;
            };

            let len = (rx * rx + ry * ry).sqrt();
            let dir = {
                let d = (rx * gx + ry * gy).abs() / len;
                if d.abs() <= 0.01 {
                    1.0e-6
                } else {
                    d
                }
            };
            let dst = 1.0 / (len * len);
            let lev = 1.0 / (1.0 + (tk - tp).abs());
            let weight = (dir * dst * lev).abs();

            let v = image.get_pixel(kx as u32, ky as u32);
            for c in 0..3 {
                acc[c] += weight * v[c] as f32;
            }
            wsum += weight;
        }
    }

    if wsum <= 0.0 {
        return None;
    }
    Some(Rgb([
        (acc[0] / wsum).round().clamp(0.0, 255.0) as u8,
        (acc[1] / wsum).round().clamp(0.0, 255.0) as u8,
        (acc[2] / wsum).round().clamp(0.0, 255.0) as u8,
    ]))
}
