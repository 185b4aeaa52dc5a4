use image::{imageops, ImageBuffer, Luma, RgbImage};
use ndarray::{Array2, Array4};

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        tensor
    }
}

/// Bilinearly resize a `[height, width]` plane to `target_width` x `target_height`.
pub fn resize_plane(plane: &Array2<f32>, target_width: u32, target_height: u32) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    if rows == target_height as usize && cols == target_width as usize {
        return plane.clone();
    }
    if rows == 0 || cols == 0 {
        return Array2::zeros((target_height as usize, target_width as usize));
    }

    let source: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([plane[[y as usize, x as usize]]])
        });
    let resized = imageops::resize(
        &source,
        target_width,
        target_height,
        imageops::FilterType::Triangle,
    );

    Array2::from_shape_fn((target_height as usize, target_width as usize), |(y, x)| {
        resized.get_pixel(x as u32, y as u32)[0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    fn preprocess_produces_normalized_nchw() {
        let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 51]));
        let tensor = Preprocessor::new(8, 4).preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, 4, 8]);
        assert_relative_eq!(tensor[[0, 0, 2, 5]], 1.0);
        assert_relative_eq!(tensor[[0, 1, 2, 5]], 0.0);
        assert_relative_eq!(tensor[[0, 2, 2, 5]], 0.2);
    }

    #[test]
    fn preprocess_resizes_to_target() {
        let image = RgbImage::from_pixel(30, 20, Rgb([10, 20, 30]));
        let tensor = Preprocessor::new(16, 16).preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn resize_plane_preserves_constant_regions() {
        let plane = Array2::from_shape_fn((10, 10), |(_, x)| if x < 5 { 0.0 } else { 1.0 });
        let resized = resize_plane(&plane, 40, 20);

        assert_eq!(resized.dim(), (20, 40));
        assert_relative_eq!(resized[[10, 2]], 0.0, epsilon = 1e-5);
        assert_relative_eq!(resized[[10, 37]], 1.0, epsilon = 1e-5);
    }
}
