//! Image/tensor codec for YOLO-style detectors.
//!
//! - `encode`: image bytes -> `[1, 3, S, S]` planar RGB tensor in `[0, 1]`.
//! - `decode`: `[1, 4 + C, N]` proposal tensor -> thresholded, suppressed
//!   detections in original-image pixels.
//!
//! Both directions are pure; the detector wraps them around its engine call.

use image::imageops::FilterType;
use image::GenericImageView;
use ndarray::{Array4, ArrayViewD, Ix3};

use crate::detect::{Detection, ImageSize, Rect};
use crate::error::PipelineError;

/// Number of leading box rows (cx, cy, w, h) in each proposal column.
const BOX_ROWS: usize = 4;

/// COCO-80 class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_labels() -> Vec<String> {
    COCO_CLASSES.iter().map(|name| name.to_string()).collect()
}

/// Thresholds applied by `decode`. Configuration, not per-call negotiable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
        }
    }
}

/// Encoded model input plus the source dimensions needed to map boxes back.
#[derive(Debug)]
pub struct EncodedFrame {
    pub tensor: Array4<f32>,
    pub original: ImageSize,
}

pub fn encode(bytes: &[u8], input_size: u32) -> Result<EncodedFrame, PipelineError> {
    if input_size == 0 {
        return Err(PipelineError::InvalidInput(
            "model input size must be greater than zero".to_string(),
        ));
    }
    let image =
        image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::Decode("image has zero area".to_string()));
    }

    let rgb = image
        .resize_exact(input_size, input_size, FilterType::Triangle)
        .into_rgb8();
    let pixels = rgb.as_raw();
    let side = input_size as usize;
    let tensor = Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
        pixels[(y * side + x) * 3 + channel] as f32 / 255.0
    });

    Ok(EncodedFrame {
        tensor,
        original: ImageSize { width, height },
    })
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    rect: Rect,
    confidence: f32,
    class_id: usize,
}

pub fn decode(
    output: ArrayViewD<'_, f32>,
    original: ImageSize,
    input_size: u32,
    params: &DecodeParams,
    labels: &[String],
) -> Result<Vec<Detection>, PipelineError> {
    let shape = output.shape().to_vec();
    let output = output.into_dimensionality::<Ix3>().map_err(|_| {
        PipelineError::Engine(format!("unexpected output shape {:?}", shape))
    })?;
    let (batch, rows, proposals) = output.dim();
    if batch != 1 || rows <= BOX_ROWS {
        return Err(PipelineError::Engine(format!(
            "unexpected output shape {:?}",
            shape
        )));
    }

    let x_factor = original.width as f32 / input_size as f32;
    let y_factor = original.height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..proposals {
        let mut best_score = 0.0f32;
        let mut best_class = None;
        for row in BOX_ROWS..rows {
            let score = output[[0, row, i]];
            if score > best_score {
                best_score = score;
                best_class = Some(row - BOX_ROWS);
            }
        }
        let Some(class_id) = best_class else {
            continue;
        };
        if best_score <= params.confidence_threshold {
            continue;
        }

        let rect = Rect::from_center(
            output[[0, 0, i]],
            output[[0, 1, i]],
            output[[0, 2, i]],
            output[[0, 3, i]],
        )
        .scale(x_factor, y_factor)
        .clip(original);
        candidates.push(Candidate {
            rect,
            confidence: best_score.min(1.0),
            class_id,
        });
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // suppress on the clipped boxes; those are what callers see
    let rects: Vec<Rect> = candidates.iter().map(|c| c.rect).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.confidence).collect();
    let kept = non_max_suppression(&rects, &scores, params.nms_threshold);

    Ok(kept
        .into_iter()
        .map(|idx| {
            let candidate = candidates[idx];
            Detection {
                class_name: label_for(labels, candidate.class_id),
                confidence: candidate.confidence,
                bounding_box: candidate.rect.clip_to(original),
            }
        })
        .collect())
}

fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Intersection over union of two corner-form boxes. Zero-area union yields 0.
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Class-agnostic greedy NMS.
///
/// Returns indices into `rects` in suppression order (highest score first).
/// Equal scores keep their input order.
pub fn non_max_suppression(rects: &[Rect], scores: &[f32], threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rects.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut suppressed = vec![false; rects.len()];
    let mut kept = Vec::new();
    for (pos, &idx) in order.iter().enumerate() {
        if suppressed[idx] {
            continue;
        }
        kept.push(idx);
        for &other in &order[pos + 1..] {
            if !suppressed[other] && iou(&rects[idx], &rects[other]) > threshold {
                suppressed[other] = true;
            }
        }
    }
    kept
}
