use super::CaptureSource;
use crate::frame::decode_frame;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "webp", "tif"];

/// Replays the image files of a directory in file-name order.
///
/// A file that cannot be decoded yields a
/// [`PipelineError::DecodeFailure`](crate::error::PipelineError::DecodeFailure)
/// for that call; the next call moves on to the following file.
pub struct ImageDirectory {
    files: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

impl ImageDirectory {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        // Resolution comes from the first readable header.
        let (width, height) = files
            .iter()
            .find_map(|path| image::image_dimensions(path).ok())
            .with_context(|| format!("No readable images in {}", dir.display()))?;

        tracing::info!(
            "Replaying {} images from {} ({}x{})",
            files.len(),
            dir.display(),
            width,
            height
        );

        Ok(Self {
            files,
            next: 0,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl CaptureSource for ImageDirectory {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let frame = decode_frame(&bytes)?;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
