// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose model metadata parsing.
//!
//! YOLO-pose exports store their configuration as YAML-ish `key: value` pairs in the
//! ONNX custom metadata. Only the fields the detector needs are kept.

use std::collections::HashMap;

use crate::error::{OverlayError, Result};

/// Metadata keys read from an exported pose model.
pub const METADATA_KEYS: [&str; 7] = [
    "description",
    "task",
    "stride",
    "imgsz",
    "kpt_shape",
    "names",
    "batch",
];

/// Configuration embedded in a pose model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseModelMetadata {
    /// Model description (e.g., "Ultralytics YOLO11n-pose model trained on coco-pose.yaml").
    pub description: String,
    /// Task name. Pose exports report `pose`.
    pub task: String,
    /// Model stride (typically 32).
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Keypoints per subject and values per keypoint, e.g. `[17, 3]`.
    pub kpt_shape: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl PoseModelMetadata {
    /// Parse metadata from `key: value` lines.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadError` if a numeric field is malformed, or if the model
    /// declares a non-pose task.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut metadata = Self::default();

        for line in yaml_str.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_matches('\'').trim_matches('"');

            match key.trim() {
                "description" => metadata.description = value.to_string(),
                "task" => metadata.task = value.to_string(),
                "stride" => {
                    metadata.stride = value.parse().map_err(|_| {
                        OverlayError::ModelLoadError(format!("Invalid stride value: {value}"))
                    })?;
                }
                _ => {}
            }
        }

        if let Some(imgsz) = parse_pair(yaml_str, "imgsz") {
            metadata.imgsz = imgsz;
        }
        if let Some(kpt_shape) = parse_pair(yaml_str, "kpt_shape") {
            metadata.kpt_shape = kpt_shape;
        }
        let names = parse_names(yaml_str);
        if !names.is_empty() {
            metadata.names = names;
        }

        if metadata.task != "pose" {
            return Err(OverlayError::ModelLoadError(format!(
                "Expected a pose model, found task '{}'",
                metadata.task
            )));
        }
        if metadata.kpt_shape.0 == 0 || metadata.kpt_shape.1 < 2 {
            return Err(OverlayError::ModelLoadError(format!(
                "Invalid kpt_shape {:?}",
                metadata.kpt_shape
            )));
        }

        Ok(metadata)
    }

    /// Number of classes the model scores, at least one.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len().max(1)
    }
}

impl Default for PoseModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            task: "pose".to_string(),
            stride: 32,
            imgsz: (640, 640),
            kpt_shape: (17, 3),
            names: HashMap::from([(0, "person".to_string())]),
        }
    }
}

/// Parse a two-element list, inline (`key: [a, b]`) or as a YAML block (`- a` lines).
fn parse_pair(yaml_str: &str, key: &str) -> Option<(usize, usize)> {
    let prefix = format!("{key}:");
    let lines: Vec<&str> = yaml_str.lines().collect();
    let start = lines.iter().position(|l| l.trim_start().starts_with(&prefix))?;
    let line = lines[start];

    let mut values: Vec<usize> = Vec::new();
    if let Some(open) = line.find('[')
        && let Some(close) = line.find(']')
        && open < close
    {
        values = line[open + 1..close]
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
    } else {
        for following in &lines[start + 1..] {
            let trimmed = following.trim();
            if let Some(item) = trimmed.strip_prefix('-') {
                if let Ok(v) = item.trim().parse() {
                    values.push(v);
                }
            } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
                break;
            }
            if values.len() >= 2 {
                break;
            }
        }
    }

    (values.len() >= 2).then(|| (values[0], values[1]))
}

/// Parse class names written as `names: {0: 'person'}` or an indented block.
fn parse_names(yaml_str: &str) -> HashMap<usize, String> {
    let mut names = HashMap::new();
    let Some(start) = yaml_str.find("names:") else {
        return names;
    };

    let rest = &yaml_str[start + 6..];
    if let Some(body) = rest.trim_start().strip_prefix('{') {
        let body = body.split('}').next().unwrap_or_default();
        for entry in body.split(',') {
            if let Some((id, name)) = entry.split_once(':')
                && let Ok(id) = id.trim().parse::<usize>()
            {
                names.insert(id, name.trim().trim_matches('\'').trim_matches('"').to_string());
            }
        }
        return names;
    }

    // First line is the remainder of `names:` itself.
    for line in rest.lines().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((id, name)) = trimmed.split_once(':') else {
            break;
        };
        let Ok(id) = id.trim().parse::<usize>() else {
            break;
        };
        names.insert(id, name.trim().trim_matches('\'').trim_matches('"').to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE_METADATA: &str = r"
description: Ultralytics YOLO11n-pose model trained on coco-pose.yaml
author: Ultralytics
stride: 32
task: pose
batch: 1
imgsz:
- 640
- 640
names:
  0: person
kpt_shape:
- 17
- 3
";

    #[test]
    fn test_parse_pose_metadata() {
        let metadata = PoseModelMetadata::from_yaml_str(POSE_METADATA).unwrap();
        assert_eq!(metadata.task, "pose");
        assert_eq!(metadata.stride, 32);
        assert_eq!(metadata.imgsz, (640, 640));
        assert_eq!(metadata.kpt_shape, (17, 3));
        assert_eq!(metadata.num_classes(), 1);
        assert_eq!(metadata.names.get(&0).map(String::as_str), Some("person"));
    }

    #[test]
    fn test_parse_inline_lists_and_dict() {
        let yaml = "task: pose\nimgsz: [480, 640]\nkpt_shape: [21, 3]\nnames: {0: 'hand'}";
        let metadata = PoseModelMetadata::from_yaml_str(yaml).unwrap();
        assert_eq!(metadata.imgsz, (480, 640));
        assert_eq!(metadata.kpt_shape, (21, 3));
        assert_eq!(metadata.names.get(&0).map(String::as_str), Some("hand"));
    }

    #[test]
    fn test_rejects_detect_model() {
        let err = PoseModelMetadata::from_yaml_str("task: detect\nstride: 32").unwrap_err();
        assert!(err.to_string().contains("Expected a pose model"));
    }

    #[test]
    fn test_invalid_stride() {
        assert!(PoseModelMetadata::from_yaml_str("task: pose\nstride: abc").is_err());
    }
}
