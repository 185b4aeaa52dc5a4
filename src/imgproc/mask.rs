use image::{GrayImage, Luma};

/// Boolean per-pixel grid, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// All-false mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Non-zero pixels become `true`.
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.as_raw().iter().map(|&v| v != 0).collect(),
        }
    }

    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Like [`get`](Self::get), but `None` outside the grid.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<bool> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width as usize + x as usize])
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Number of `true` pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|&v| v)
    }

    /// Logical OR with a mask of the same size.
    pub fn union_with(&mut self, other: &Mask) {
        assert_eq!(self.dimensions(), other.dimensions(), "mask size mismatch");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a |= b;
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_count() {
        let mut a = Mask::from_fn(4, 4, |x, _| x == 0);
        let b = Mask::from_fn(4, 4, |_, y| y == 0);
        a.union_with(&b);

        assert_eq!(a.count(), 7);
        assert!(a.get(0, 3));
        assert!(a.get(3, 0));
        assert!(!a.get(3, 3));
    }

    #[test]
    fn gray_conversion_round_trips() {
        let mask = Mask::from_fn(5, 3, |x, y| (x + y) % 2 == 0);
        let gray = mask.to_gray();
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
        assert_eq!(Mask::from_gray(&gray), mask);
    }

    #[test]
    fn checked_access_outside_is_none() {
        let mask = Mask::new(2, 2);
        assert_eq!(mask.get_checked(-1, 0), None);
        assert_eq!(mask.get_checked(2, 1), None);
        assert_eq!(mask.get_checked(1, 1), Some(false));
    }
}
