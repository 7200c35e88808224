// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO-pose detectors backed by ONNX Runtime.
//!
//! [`OnnxPoseDetector`] loads an exported pose model, letterboxes each frame to the
//! model input size, decodes the raw output tensor and maps every keypoint through a
//! [`KeypointLayout`] into the crate's joint vocabulary. Joint positions are reported
//! normalized with a bottom-left origin, like every other [`PoseDetector`].
//!
//! # Example
//!
//! ```no_run
//! use posture_overlay::SkeletonKind;
//! use posture_overlay::onnx::{DetectorConfig, OnnxPoseDetector};
//!
//! let config = DetectorConfig::new().with_confidence(0.4);
//! let detector = OnnxPoseDetector::load("yolo11n-pose.onnx", SkeletonKind::Body, config)?;
//! # Ok::<(), posture_overlay::OverlayError>(())
//! ```

pub mod metadata;
pub mod postprocess;
pub mod preprocess;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use image::RgbaImage;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::detector::PoseDetector;
use crate::error::{OverlayError, Result};
use crate::skeleton::{
    BodyJoint, HandJoint, Joint, JointObservation, SkeletonKind, SkeletonObservation,
};
use crate::verbose;

pub use metadata::PoseModelMetadata;
pub use postprocess::{DecodeOptions, PoseCandidate, decode_pose};
pub use preprocess::{Letterboxed, letterbox};

/// COCO keypoint order used by YOLO body-pose models.
const COCO17: [BodyJoint; 17] = [
    BodyJoint::Nose,
    BodyJoint::LeftEye,
    BodyJoint::RightEye,
    BodyJoint::LeftEar,
    BodyJoint::RightEar,
    BodyJoint::LeftShoulder,
    BodyJoint::RightShoulder,
    BodyJoint::LeftElbow,
    BodyJoint::RightElbow,
    BodyJoint::LeftWrist,
    BodyJoint::RightWrist,
    BodyJoint::LeftHip,
    BodyJoint::RightHip,
    BodyJoint::LeftKnee,
    BodyJoint::RightKnee,
    BodyJoint::LeftAnkle,
    BodyJoint::RightAnkle,
];

/// Settings for an ONNX pose detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Subjects scoring below this are discarded.
    pub confidence_threshold: f32,
    /// IoU threshold for Non-Maximum Suppression.
    pub iou_threshold: f32,
    /// Maximum subjects reported per frame.
    pub max_detections: usize,
    /// Explicit input size (height, width). `None` uses the model metadata.
    pub imgsz: Option<(usize, usize)>,
    /// Intra-op threads for ONNX Runtime. `0` lets the runtime decide.
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            imgsz: None,
            num_threads: 0,
        }
    }
}

impl DetectorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }
}

/// How a model's keypoint indices map onto joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointLayout {
    /// 17 COCO keypoints. `neck` and `root` are derived from the shoulders and hips.
    Coco17,
    /// 21 hand keypoints in wrist, thumb, index, middle, ring, little order.
    Hand21,
}

impl KeypointLayout {
    #[must_use]
    pub const fn for_kind(kind: SkeletonKind) -> Self {
        match kind {
            SkeletonKind::Body => Self::Coco17,
            SkeletonKind::Hand => Self::Hand21,
        }
    }

    #[must_use]
    pub const fn kind(self) -> SkeletonKind {
        match self {
            Self::Coco17 => SkeletonKind::Body,
            Self::Hand21 => SkeletonKind::Hand,
        }
    }

    /// Keypoints per subject the model must produce.
    #[must_use]
    pub const fn keypoint_count(self) -> usize {
        match self {
            Self::Coco17 => COCO17.len(),
            Self::Hand21 => HandJoint::ALL.len(),
        }
    }

    /// Joint reported at model keypoint `index`.
    #[must_use]
    pub fn joint(self, index: usize) -> Option<Joint> {
        match self {
            Self::Coco17 => COCO17.get(index).copied().map(Joint::Body),
            Self::Hand21 => HandJoint::ALL.get(index).copied().map(Joint::Hand),
        }
    }

    /// Convert pixel keypoints of a `width` x `height` image into a normalized,
    /// bottom-left origin observation.
    #[must_use]
    pub fn to_observation(
        self,
        keypoints: &[[f32; 3]],
        width: u32,
        height: u32,
    ) -> SkeletonObservation {
        let mut observation = SkeletonObservation::new(self.kind());
        if width == 0 || height == 0 {
            return observation;
        }
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (width as f32, height as f32);

        for (index, kpt) in keypoints.iter().enumerate() {
            if let Some(joint) = self.joint(index) {
                let x = (kpt[0] / w).clamp(0.0, 1.0);
                let y = (1.0 - kpt[1] / h).clamp(0.0, 1.0);
                observation.insert(joint, JointObservation::new(x, y, kpt[2].clamp(0.0, 1.0)));
            }
        }

        if self == Self::Coco17 {
            derive_midpoint(
                &mut observation,
                BodyJoint::LeftShoulder,
                BodyJoint::RightShoulder,
                BodyJoint::Neck,
            );
            derive_midpoint(
                &mut observation,
                BodyJoint::LeftHip,
                BodyJoint::RightHip,
                BodyJoint::Root,
            );
        }
        observation
    }
}

/// Insert `target` halfway between `a` and `b`, as confident as the weaker of the two.
fn derive_midpoint(
    observation: &mut SkeletonObservation,
    a: BodyJoint,
    b: BodyJoint,
    target: BodyJoint,
) {
    let (Some(a), Some(b)) = (
        observation.get(a.into()).copied(),
        observation.get(b.into()).copied(),
    ) else {
        return;
    };
    observation.insert(
        target,
        JointObservation::new(
            (a.position.x + b.position.x) / 2.0,
            (a.position.y + b.position.y) / 2.0,
            a.confidence.min(b.confidence),
        ),
    );
}

/// Pose detector running a YOLO-pose ONNX model.
pub struct OnnxPoseDetector {
    session: Mutex<Session>,
    metadata: PoseModelMetadata,
    layout: KeypointLayout,
    input_name: String,
    output_name: String,
    config: DetectorConfig,
}

impl std::fmt::Debug for OnnxPoseDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPoseDetector")
            .field("metadata", &self.metadata)
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OnnxPoseDetector {
    /// Load a pose model producing skeletons of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadError` if the file is missing, ONNX Runtime rejects it, or
    /// its keypoint count does not match the layout for `kind`.
    pub fn load<P: AsRef<Path>>(
        path: P,
        kind: SkeletonKind,
        config: DetectorConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OverlayError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| load_error("create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error("set optimization level", e))?
            .with_intra_threads(config.num_threads)
            .map_err(|e| load_error("set intra-thread count", e))?
            .commit_from_file(path)
            .map_err(|e| load_error("load model", e))?;

        let metadata = Self::extract_metadata(&session)?;
        let layout = KeypointLayout::for_kind(kind);
        if metadata.kpt_shape.0 != layout.keypoint_count() {
            return Err(OverlayError::ModelLoadError(format!(
                "{} produces {} keypoints, a {kind} model needs {}",
                path.display(),
                metadata.kpt_shape.0,
                layout.keypoint_count()
            )));
        }

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map_or_else(|| "output0".to_string(), |o| o.name.clone());

        verbose!(
            "Loaded {kind} pose model {} ({}x{}, {} keypoints)",
            path.display(),
            metadata.imgsz.0,
            metadata.imgsz.1,
            metadata.kpt_shape.0
        );

        Ok(Self {
            session: Mutex::new(session),
            metadata,
            layout,
            input_name,
            output_name,
            config,
        })
    }

    fn extract_metadata(session: &Session) -> Result<PoseModelMetadata> {
        let model_metadata = session
            .metadata()
            .map_err(|e| load_error("get model metadata", e))?;

        let lines: Vec<String> = metadata::METADATA_KEYS
            .iter()
            .filter_map(|key| match model_metadata.custom(key) {
                Ok(Some(value)) => Some(format!("{key}: {value}")),
                _ => None,
            })
            .collect();

        if lines.is_empty() {
            return Ok(PoseModelMetadata::default());
        }
        PoseModelMetadata::from_yaml_str(&lines.join("\n"))
    }

    #[must_use]
    pub const fn metadata(&self) -> &PoseModelMetadata {
        &self.metadata
    }

    #[must_use]
    pub const fn layout(&self) -> KeypointLayout {
        self.layout
    }

    fn run_inference(&self, input: &Letterboxed) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.tensor.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            OverlayError::DetectionError(format!("Failed to create input tensor: {e}"))
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(inputs)
            .map_err(|e| OverlayError::DetectionError(format!("Inference failed: {e}")))?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            OverlayError::DetectionError(format!("Output '{}' not found", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| OverlayError::DetectionError(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((data.to_vec(), shape))
    }
}

impl PoseDetector for OnnxPoseDetector {
    fn kind(&self) -> SkeletonKind {
        self.layout.kind()
    }

    fn detect(&self, image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        let target = self.config.imgsz.unwrap_or(self.metadata.imgsz);
        let boxed = letterbox(image, target)?;
        let (output, shape) = self.run_inference(&boxed)?;

        let options = DecodeOptions {
            confidence_threshold: self.config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
            max_detections: self.config.max_detections,
            num_classes: self.metadata.num_classes(),
            kpt_shape: self.metadata.kpt_shape,
        };
        let (width, height) = image.dimensions();
        Ok(decode_pose(&output, &shape, &boxed, &options)
            .iter()
            .map(|candidate| self.layout.to_observation(&candidate.keypoints, width, height))
            .collect())
    }
}

fn load_error(action: &str, e: impl std::fmt::Display) -> OverlayError {
    OverlayError::ModelLoadError(format!("Failed to {action}: {e}"))
}
