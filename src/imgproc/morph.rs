//! Binary morphology.

use super::Mask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelShape {
    Rect,
    Ellipse,
}

/// A structuring element stored as offsets from its anchor (the kernel centre).
#[derive(Clone, Debug)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    pub fn new(shape: KernelShape, width: u32, height: u32) -> Self {
        match shape {
            KernelShape::Rect => Self::rect(width, height),
            KernelShape::Ellipse => Self::ellipse(width, height),
        }
    }

    pub fn rect(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self::from_rows(width, height, |_| (0, width))
    }

    /// Ellipse inscribed in the `width` x `height` box. Small sizes degrade
    /// to a cross (3x3) or a corner-less block.
    pub fn ellipse(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let r = (height / 2) as i32;
        let c = (width / 2) as i32;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        Self::from_rows(width, height, |i| {
            let dy = i as i32 - r;
            if dy.abs() > r {
                return (0, 0);
            }
            let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
            let j1 = (c - dx).max(0) as u32;
            let j2 = ((c + dx + 1) as u32).min(width);
            (j1, j2)
        })
    }

    fn from_rows(width: u32, height: u32, span: impl Fn(u32) -> (u32, u32)) -> Self {
        let ax = (width / 2) as i32;
        let ay = (height / 2) as i32;
        let mut offsets = Vec::new();
        for i in 0..height {
            let (j1, j2) = span(i);
            for j in j1..j2 {
                offsets.push((j as i32 - ax, i as i32 - ay));
            }
        }
        Self {
            width,
            height,
            offsets,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }
}

/// A pixel becomes set if any element of the reflected kernel hits a set pixel.
/// Samples outside the grid never contribute.
pub fn dilate(mask: &Mask, element: &StructuringElement) -> Mask {
    let (w, h) = mask.dimensions();
    Mask::from_fn(w, h, |x, y| {
        element.offsets.iter().any(|&(dx, dy)| {
            mask.get_checked(x as i64 - dx as i64, y as i64 - dy as i64)
                .unwrap_or(false)
        })
    })
}

/// A pixel stays set only if every kernel sample is set.
/// Samples outside the grid never erode.
pub fn erode(mask: &Mask, element: &StructuringElement) -> Mask {
    let (w, h) = mask.dimensions();
    Mask::from_fn(w, h, |x, y| {
        element.offsets.iter().all(|&(dx, dy)| {
            mask.get_checked(x as i64 + dx as i64, y as i64 + dy as i64)
                .unwrap_or(true)
        })
    })
}

/// Erode then dilate: removes specks smaller than the kernel.
pub fn open(mask: &Mask, element: &StructuringElement) -> Mask {
    dilate(&erode(mask, element), element)
}

/// Dilate then erode: fills gaps smaller than the kernel.
pub fn close(mask: &Mask, element: &StructuringElement) -> Mask {
    erode(&dilate(mask, element), element)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(element: &StructuringElement) -> Vec<String> {
        let (w, h) = element.size();
        let (ax, ay) = ((w / 2) as i32, (h / 2) as i32);
        (0..h as i32)
            .map(|i| {
                (0..w as i32)
                    .map(|j| {
                        if element.offsets().contains(&(j - ax, i - ay)) {
                            '#'
                        } else {
                            '.'
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn small_ellipses_have_expected_shape() {
        assert_eq!(
            rendered(&StructuringElement::ellipse(3, 3)),
            vec![".#.", "###", ".#."]
        );
        assert_eq!(
            rendered(&StructuringElement::ellipse(5, 5)),
            vec!["..#..", "#####", "#####", "#####", "..#.."]
        );
    }

    #[test]
    fn open_removes_isolated_pixel() {
        let mut mask = Mask::from_fn(20, 20, |x, y| (5..12).contains(&x) && (5..12).contains(&y));
        mask.set(16, 16, true);
        let opened = open(&mask, &StructuringElement::ellipse(3, 3));

        assert!(!opened.get(16, 16));
        assert!(opened.get(8, 8));
        assert!(opened.get(5, 8));
    }

    #[test]
    fn close_fills_small_gap() {
        let mask = Mask::from_fn(20, 5, |x, _| x != 10);
        let closed = close(&mask, &StructuringElement::rect(3, 3));
        assert!(closed.get(10, 2));
        assert_eq!(closed.count(), 100);
    }

    #[test]
    fn close_keeps_rectangle_unchanged() {
        let mask = Mask::from_fn(30, 30, |x, y| (10..20).contains(&x) && (8..22).contains(&y));
        for element in [
            StructuringElement::rect(7, 7),
            StructuringElement::ellipse(5, 5),
            StructuringElement::ellipse(2, 2),
        ] {
            assert_eq!(close(&mask, &element), mask);
        }
    }
}
