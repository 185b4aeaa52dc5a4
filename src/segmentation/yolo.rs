//! YOLOv8 instance segmentation.

use super::types::Segment;
use ndarray::{Array2, ArrayView2, ArrayView3};

#[cfg(feature = "onnx")]
pub use self::model::YoloSegmenter;

/// IoU above which a lower-scoring box of the same class is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// COCO class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class{class_id}"))
}

#[derive(Clone, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    /// x1, y1, x2, y2 in model input pixels.
    bbox: [f32; 4],
    anchor: usize,
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Decode raw YOLOv8-seg outputs into segments.
///
/// * `predictions` - `[4 + classes + coefficients, anchors]`, boxes as
///   centre/size in input pixels
/// * `protos` - `[coefficients, mask_h, mask_w]` prototype masks
/// * `input_size` - model input (width, height)
///
/// Masks come back at prototype resolution, cropped to their box.
pub fn decode_yolo_seg(
    predictions: ArrayView2<f32>,
    protos: ArrayView3<f32>,
    input_size: (u32, u32),
    min_confidence: f32,
) -> Vec<Segment> {
    let (num_coeffs, mask_h, mask_w) = protos.dim();
    let (channels, anchors) = predictions.dim();
    if channels <= 4 + num_coeffs {
        return Vec::new();
    }
    let num_classes = channels - 4 - num_coeffs;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let column = predictions.column(anchor);
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, column[4 + c]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        candidates.push(Candidate {
            class_id,
            score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            anchor,
        });
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.anchor.cmp(&b.anchor)));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > NMS_IOU_THRESHOLD);
        if !suppressed {
            kept.push(cand);
        }
    }

    let flat_protos = Array2::from_shape_fn((num_coeffs, mask_h * mask_w), |(c, i)| {
        protos[[c, i / mask_w, i % mask_w]]
    });
    let sx = mask_w as f32 / input_size.0.max(1) as f32;
    let sy = mask_h as f32 / input_size.1.max(1) as f32;

    kept.into_iter()
        .map(|cand| {
            let coeffs = predictions
                .column(cand.anchor)
                .slice_move(ndarray::s![4 + num_classes..])
                .to_owned();
            let logits = coeffs.dot(&flat_protos);

            let x1 = cand.bbox[0] * sx;
            let y1 = cand.bbox[1] * sy;
            let x2 = cand.bbox[2] * sx;
            let y2 = cand.bbox[3] * sy;

            let mask = Array2::from_shape_fn((mask_h, mask_w), |(y, x)| {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                if px < x1 || px > x2 || py < y1 || py > y2 {
                    0.0
                } else {
                    sigmoid(logits[y * mask_w + x])
                }
            });

            Segment {
                label: class_name(cand.class_id),
                confidence: cand.score,
                mask,
            }
        })
        .collect()
}

#[inline]
fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(feature = "onnx")]
mod model {
    use super::decode_yolo_seg;
    use crate::segmentation::preprocess::Preprocessor;
    use crate::segmentation::types::{Segment, SegmentationModel};
    use anyhow::{Context, Result};
    use image::RgbImage;
    use ndarray::{Axis, Ix3, Ix4};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    /// YOLOv8-seg exported to ONNX with the usual `images` input and
    /// `output0`/`output1` outputs.
    pub struct YoloSegmenter {
        session: Session,
        preprocessor: Preprocessor,
        size: u32,
    }

    impl YoloSegmenter {
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let path = model_path.as_ref();
            tracing::info!("Loading YOLOv8-seg model from {}", path.display());

            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(path)
                .with_context(|| format!("Failed to load model from {}", path.display()))?;

            let size = 640;
            Ok(Self {
                session,
                preprocessor: Preprocessor::new(size, size),
                size,
            })
        }
    }

    /// Drop the leading batch axis of a `[1, ...]` view.
    fn first_batch<'a, D: ndarray::RemoveAxis>(
        view: ndarray::ArrayView<'a, f32, D>,
    ) -> ndarray::ArrayView<'a, f32, D::Smaller> {
        view.index_axis_move(Axis(0), 0)
    }

    impl SegmentationModel for YoloSegmenter {
        fn detect(&mut self, frame: &RgbImage, min_confidence: f32) -> Result<Vec<Segment>> {
            let _span = tracing::debug_span!("yolo_segment").entered();

            let input = Tensor::from_array(self.preprocessor.preprocess(frame))?;
            let outputs = self
                .session
                .run(ort::inputs!["images" => input])
                .context("Segmentation inference failed")?;

            let predictions: ndarray::ArrayViewD<f32> = outputs["output0"]
                .try_extract_array()
                .context("Failed to extract output0")?;
            let protos: ndarray::ArrayViewD<f32> = outputs["output1"]
                .try_extract_array()
                .context("Failed to extract output1")?;

            let predictions = first_batch(predictions.into_dimensionality::<Ix3>()?);
            let protos = first_batch(protos.into_dimensionality::<Ix4>()?);

            let segments = decode_yolo_seg(
                predictions,
                protos,
                (self.size, self.size),
                min_confidence,
            );
            tracing::debug!(count = segments.len(), "segments decoded");
            Ok(segments)
        }

        fn name(&self) -> &'static str {
            "yolov8-seg"
        }

        fn input_size(&self) -> (u32, u32) {
            (self.size, self.size)
        }
    }
}
