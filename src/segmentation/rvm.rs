use super::preprocess::Preprocessor;
use super::types::{Segment, SegmentationModel};
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{arr1, Array2, Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use std::path::Path;

/// RobustVideoMatting person matting model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
/// The alpha matte is reported as a single "person" segment whose
/// confidence is the peak alpha value.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    r1: Option<Array4<f32>>,
    r2: Option<Array4<f32>>,
    r3: Option<Array4<f32>>,
    r4: Option<Array4<f32>>,

    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
            downsample_ratio: 0.25,
        })
    }

    /// Zeroed hidden states sized for the current input resolution.
    fn zero_states(&self) -> [Array4<f32>; 4] {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        [
            Array4::zeros((1, 16, h / 2, w / 2)),
            Array4::zeros((1, 20, h / 4, w / 4)),
            Array4::zeros((1, 40, h / 8, w / 8)),
            Array4::zeros((1, 64, h / 16, w / 16)),
        ]
    }
}

fn extract_state(value: &DynValue, name: &str) -> Result<Array4<f32>> {
    let view: ndarray::ArrayViewD<f32> = value
        .try_extract_array()
        .with_context(|| format!("Failed to extract {name}"))?;
    Ok(view.to_owned().into_dimensionality::<Ix4>()?)
}

impl SegmentationModel for RobustVideoMatting {
    fn detect(&mut self, frame: &RgbImage, min_confidence: f32) -> Result<Vec<Segment>> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let [r1, r2, r3, r4] = match (
            self.r1.take(),
            self.r2.take(),
            self.r3.take(),
            self.r4.take(),
        ) {
            (Some(r1), Some(r2), Some(r3), Some(r4)) => [r1, r2, r3, r4],
            _ => self.zero_states(),
        };

        let src = Tensor::from_array(self.preprocessor.preprocess(frame))?;
        let ratio = Tensor::from_array(arr1(&[self.downsample_ratio]))?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                "src" => src,
                "r1i" => Tensor::from_array(r1)?,
                "r2i" => Tensor::from_array(r2)?,
                "r3i" => Tensor::from_array(r3)?,
                "r4i" => Tensor::from_array(r4)?,
                "downsample_ratio" => ratio
            ])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Alpha matte has shape [1, 1, H, W]
        let pha: ndarray::ArrayViewD<f32> = outputs["pha"]
            .try_extract_array()
            .context("Failed to extract pha")?;
        let shape = pha.shape();
        if shape.len() != 4 {
            anyhow::bail!("unexpected matte shape {:?}", shape);
        }
        let (mh, mw) = (shape[2], shape[3]);
        let matte = Array2::from_shape_fn((mh, mw), |(y, x)| pha[[0, 0, y, x]].clamp(0.0, 1.0));

        self.r1 = Some(extract_state(&outputs["r1o"], "r1o")?);
        self.r2 = Some(extract_state(&outputs["r2o"], "r2o")?);
        self.r3 = Some(extract_state(&outputs["r3o"], "r3o")?);
        self.r4 = Some(extract_state(&outputs["r4o"], "r4o")?);

        let peak = matte.iter().copied().fold(0.0f32, f32::max);
        if peak < min_confidence {
            return Ok(Vec::new());
        }

        Ok(vec![Segment {
            label: "person".to_string(),
            confidence: peak,
            mask: matte,
        }])
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.r1 = None;
        self.r2 = None;
        self.r3 = None;
        self.r4 = None;
    }

    fn name(&self) -> &'static str {
        "rvm"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
