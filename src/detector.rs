// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose detector abstraction.
//!
//! A detector turns one RGBA image into zero or more [`SkeletonObservation`]s of a
//! single [`SkeletonKind`]. Detectors report every joint they recognize; choosing
//! which joints to draw is left to the annotator.

use image::RgbaImage;

use crate::error::Result;
use crate::skeleton::{SkeletonKind, SkeletonObservation};

/// Body or hand pose estimator.
///
/// Implementations must be shareable across threads: the pipeline runs the body and
/// hand detectors concurrently on the same frame.
pub trait PoseDetector: Send + Sync {
    /// Skeleton family produced by this detector.
    fn kind(&self) -> SkeletonKind;

    /// Detect every subject in `image`.
    ///
    /// # Errors
    ///
    /// Returns `DetectionError` (or a model/IO error) if inference fails.
    fn detect(&self, image: &RgbaImage) -> Result<Vec<SkeletonObservation>>;
}

/// Detector that never finds anyone. Stands in for a disabled model.
#[derive(Debug, Clone, Copy)]
pub struct NullDetector {
    kind: SkeletonKind,
}

impl NullDetector {
    #[must_use]
    pub const fn new(kind: SkeletonKind) -> Self {
        Self { kind }
    }
}

impl PoseDetector for NullDetector {
    fn kind(&self) -> SkeletonKind {
        self.kind
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_detector() {
        let detector = NullDetector::new(SkeletonKind::Body);
        assert_eq!(detector.kind(), SkeletonKind::Body);
        assert!(detector.detect(&RgbaImage::new(4, 4)).unwrap().is_empty());
    }
}
