// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding of YOLO-pose output tensors.

use std::cmp::Ordering;

use ndarray::{Array2, s};

use crate::onnx::preprocess::{Letterboxed, unletterbox};
use crate::warn;

/// One detected subject in original image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    /// Box as [x1, y1, x2, y2].
    pub bbox: [f32; 4],
    /// Best class score.
    pub score: f32,
    /// Keypoints as [x, y, confidence] in original image pixels.
    pub keypoints: Vec<[f32; 3]>,
}

/// Thresholds applied while decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Class count declared by the model metadata.
    pub num_classes: usize,
    /// Keypoints per subject and values per keypoint.
    pub kpt_shape: (usize, usize),
}

/// Decode a `[1, 4 + classes + K * D, N]` (or transposed) pose output.
///
/// Candidates below the confidence threshold are dropped, overlapping boxes are
/// suppressed, and coordinates are mapped back through the letterbox.
#[must_use]
pub fn decode_pose(
    output: &[f32],
    output_shape: &[usize],
    letterbox: &Letterboxed,
    options: &DecodeOptions,
) -> Vec<PoseCandidate> {
    let (num_keypoints, kpt_dim) = options.kpt_shape;
    let kpt_features = num_keypoints * kpt_dim;
    if kpt_dim < 2 {
        return Vec::new();
    }

    let expected_features = 4 + options.num_classes.max(1) + kpt_features;
    let (num_preds, is_transposed) = match output_shape {
        [_, a, b] | [a, b] => {
            let (a, b) = (*a, *b);
            if a == expected_features {
                (b, false)
            } else if b == expected_features {
                (a, true)
            } else if a < b {
                (b, false)
            } else {
                (a, true)
            }
        }
        _ => (0, false),
    };
    if output.is_empty() || num_preds == 0 || output.len() % num_preds != 0 {
        return Vec::new();
    }

    let features = output.len() / num_preds;
    if features <= 4 + kpt_features {
        warn!(
            "Pose model has insufficient features ({features}), expected more than {}",
            4 + kpt_features
        );
        return Vec::new();
    }
    let num_classes = features - 4 - kpt_features;

    let Ok(rows) = to_rows(output, num_preds, features, is_transposed) else {
        return Vec::new();
    };

    let (orig_h, orig_w) = letterbox.orig_shape;
    #[allow(clippy::cast_precision_loss)]
    let (max_x, max_y) = (orig_w as f32, orig_h as f32);

    let mut candidates = Vec::new();
    for i in 0..num_preds {
        let score = rows
            .slice(s![i, 4..4 + num_classes])
            .iter()
            .map(|&v| if v.is_nan() { 0.0 } else { v })
            .fold(0.0_f32, f32::max);
        if score < options.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
        let (scale, padding) = (letterbox.scale, letterbox.padding);
        let (x1, y1) = unletterbox((cx - w / 2.0, cy - h / 2.0), scale, padding);
        let (x2, y2) = unletterbox((cx + w / 2.0, cy + h / 2.0), scale, padding);
        let bbox = [
            x1.clamp(0.0, max_x),
            y1.clamp(0.0, max_y),
            x2.clamp(0.0, max_x),
            y2.clamp(0.0, max_y),
        ];

        let kpt_start = 4 + num_classes;
        let keypoints = (0..num_keypoints)
            .map(|k| {
                let offset = kpt_start + k * kpt_dim;
                let (x, y) =
                    unletterbox((rows[[i, offset]], rows[[i, offset + 1]]), scale, padding);
                // Two-value layouts carry no visibility; treat them as certain.
                let conf = if kpt_dim > 2 { rows[[i, offset + 2]] } else { 1.0 };
                [x.clamp(0.0, max_x), y.clamp(0.0, max_y), conf]
            })
            .collect();

        candidates.push(PoseCandidate {
            bbox,
            score,
            keypoints,
        });
    }

    let boxes: Vec<([f32; 4], f32)> = candidates.iter().map(|c| (c.bbox, c.score)).collect();
    let keep = nms(&boxes, options.iou_threshold);
    keep.into_iter()
        .take(options.max_detections)
        .map(|idx| candidates[idx].clone())
        .collect()
}

/// Lay the output out as `[preds, features]`.
fn to_rows(
    output: &[f32],
    num_preds: usize,
    features: usize,
    is_transposed: bool,
) -> Result<Array2<f32>, ndarray::ShapeError> {
    if is_transposed {
        Array2::from_shape_vec((num_preds, features), output.to_vec())
    } else {
        Ok(Array2::from_shape_vec((features, num_preds), output.to_vec())?
            .t()
            .to_owned())
    }
}

/// Intersection over Union of two `[x1, y1, x2, y2]` boxes.
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
}

/// Greedy Non-Maximum Suppression. Returns kept indices, best score first.
#[must_use]
pub fn nms(boxes: &[([f32; 4], f32)], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..boxes.len()).collect();
    indices.sort_by(|&a, &b| boxes[b].1.partial_cmp(&boxes[a].1).unwrap_or(Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];
    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &indices {
            if !suppressed[j] && i != j && calculate_iou(&boxes[i].0, &boxes[j].0) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}
