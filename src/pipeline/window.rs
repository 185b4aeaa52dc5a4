use std::collections::VecDeque;

use image::RgbImage;

use crate::imgproc::Mask;

/// An aligned frame with its presenter mask.
#[derive(Clone, Debug)]
pub struct WindowEntry {
    pub frame: RgbImage,
    pub occupancy: Mask,
}

/// Bounded FIFO of recent qualifying frames.
#[derive(Debug)]
pub struct TemporalWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
    min_batch: usize,
}

impl TemporalWindow {
    /// `capacity` is at least 1 and `min_batch` is clamped into `1..=capacity`.
    pub fn new(capacity: usize, min_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            min_batch: min_batch.clamp(1, capacity),
        }
    }

    /// Push to the tail; returns the evicted head when over capacity.
    pub fn append(&mut self, frame: RgbImage, occupancy: Mask) -> Option<WindowEntry> {
        self.entries.push_back(WindowEntry { frame, occupancy });
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn ready(&self) -> bool {
        self.entries.len() >= self.min_batch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_batch(&self) -> usize {
        self.min_batch
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn tagged(tag: u8) -> (RgbImage, Mask) {
        (RgbImage::from_pixel(2, 2, Rgb([tag, 0, 0])), Mask::new(2, 2))
    }

    #[test]
    fn evicts_oldest_first() {
        let mut window = TemporalWindow::new(3, 2);
        for tag in 0..3 {
            let (f, m) = tagged(tag);
            assert!(window.append(f, m).is_none());
        }

        let (f, m) = tagged(3);
        let evicted = window.append(f, m).unwrap();
        assert_eq!(evicted.frame.get_pixel(0, 0)[0], 0);

        let tags: Vec<u8> = window.iter().map(|e| e.frame.get_pixel(0, 0)[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn ready_once_min_batch_reached() {
        let mut window = TemporalWindow::new(20, 5);
        for tag in 0..4 {
            let (f, m) = tagged(tag);
            window.append(f, m);
            assert!(!window.ready());
        }
        let (f, m) = tagged(4);
        window.append(f, m);
        assert!(window.ready());

        window.clear();
        assert!(window.is_empty());
        assert!(!window.ready());
    }

    #[test]
    fn batch_is_clamped_to_capacity() {
        let window = TemporalWindow::new(3, 10);
        assert_eq!(window.min_batch(), 3);
        let window = TemporalWindow::new(0, 0);
        assert_eq!((window.capacity(), window.min_batch()), (1, 1));
    }
}
