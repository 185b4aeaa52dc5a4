//! Outer contours of connected foreground regions.

use std::collections::VecDeque;

use super::Mask;
use crate::frame::Region;

/// Neighbour offsets in clockwise order (image y axis points down), starting east.
const RING: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Closed outer boundary of one 8-connected foreground component, as pixel centres.
#[derive(Clone, Debug)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

impl Contour {
    /// Enclosed polygon area (shoelace formula over pixel centres).
    ///
    /// A fully set `w` x `h` block has area `(w - 1) * (h - 1)`.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice = 0i64;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            twice += x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64;
        }
        twice.abs() as f64 / 2.0
    }

    pub fn bounding_rect(&self) -> Region {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if self.points.is_empty() {
            return Region::new(0, 0, 0, 0);
        }
        Region::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

/// Outer contours of every foreground component not nested inside a hole of
/// another component.
pub fn external_contours(mask: &Mask) -> Vec<Contour> {
    let _span = tracing::debug_span!("external_contours").entered();

    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let width = w as usize;
    let outside = reachable_background(mask);

    let mut labels = vec![0u32; mask.len()];
    let mut next_label = 0u32;
    let mut contours = Vec::new();
    let mut queue = VecDeque::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * width + x as usize;
            if !mask.get(x, y) || labels[idx] != 0 {
                continue;
            }

            // First pixel of a new component in raster order: its west and
            // northern neighbours are background, which the tracer relies on.
            next_label += 1;
            labels[idx] = next_label;
            queue.push_back((x as i32, y as i32));
            let mut external = false;
            let mut size = 0usize;

            while let Some((cx, cy)) = queue.pop_front() {
                size += 1;
                for &(dx, dy) in &RING {
                    let (nx, ny) = (cx + dx, cy + dy);
                    match mask.get_checked(nx as i64, ny as i64) {
                        None => external = true,
                        Some(true) => {
                            let nidx = ny as usize * width + nx as usize;
                            if labels[nidx] == 0 {
                                labels[nidx] = next_label;
                                queue.push_back((nx, ny));
                            }
                        }
                        Some(false) => {
                            let is_cross = dx == 0 || dy == 0;
                            if is_cross && outside[ny as usize * width + nx as usize] {
                                external = true;
                            }
                        }
                    }
                }
            }

            if external {
                contours.push(trace_boundary(mask, (x as i32, y as i32), size));
            }
        }
    }

    contours
}

/// Background pixels 4-connected to the image border.
fn reachable_background(mask: &Mask) -> Vec<bool> {
    let (w, h) = mask.dimensions();
    let width = w as usize;
    let mut seen = vec![false; mask.len()];
    let mut queue = VecDeque::new();

    let seed = |x: u32, y: u32, seen: &mut Vec<bool>, queue: &mut VecDeque<(u32, u32)>| {
        let idx = y as usize * width + x as usize;
        if !mask.get(x, y) && !seen[idx] {
            seen[idx] = true;
            queue.push_back((x, y));
        }
    };

    for x in 0..w {
        seed(x, 0, &mut seen, &mut queue);
        seed(x, h - 1, &mut seen, &mut queue);
    }
    for y in 0..h {
        seed(0, y, &mut seen, &mut queue);
        seed(w - 1, y, &mut seen, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if mask.get_checked(nx, ny) == Some(false) {
                let nidx = ny as usize * width + nx as usize;
                if !seen[nidx] {
                    seen[nidx] = true;
                    queue.push_back((nx as u32, ny as u32));
                }
            }
        }
    }

    seen
}

/// Moore-neighbour tracing with Jacob's stopping criterion.
fn trace_boundary(mask: &Mask, start: (i32, i32), component_size: usize) -> Contour {
    let is_set = |p: (i32, i32)| mask.get_checked(p.0 as i64, p.1 as i64).unwrap_or(false);

    let mut points = vec![start];
    let mut current = start;
    // Entered from the west: the start pixel is first in raster order.
    let mut backtrack = 4usize;
    let mut first_move: Option<usize> = None;
    let max_steps = 4 * component_size + 8;

    for _ in 0..max_steps {
        let next = (1..=8)
            .map(|k| (backtrack + k) % 8)
            .find(|&d| is_set((current.0 + RING[d].0, current.1 + RING[d].1)));
        let Some(dir) = next else {
            break;
        };

        if current == start {
            match first_move {
                None => first_move = Some(dir),
                Some(first) if first == dir => break,
                Some(_) => {}
            }
        }

        let last_free = RING[(dir + 7) % 8];
        let step = RING[dir];
        let rel = (last_free.0 - step.0, last_free.1 - step.1);
        backtrack = RING.iter().position(|&o| o == rel).unwrap_or(4);

        current = (current.0 + step.0, current.1 + step.1);
        points.push(current);
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }

    Contour { points }
}
