// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pipeline configuration.
//!
//! This module defines the [`PipelineConfig`] struct, which controls how often pose
//! detection runs, when joints and bones are confident enough to draw, how large the
//! overlay is, and which skeleton styles are used for bodies and hands.

use crate::annotate::SkeletonStyle;
use crate::error::{OverlayError, Result};

/// Configuration for the frame processing pipeline.
///
/// It uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use posture_overlay::PipelineConfig;
///
/// let config = PipelineConfig::new()
///     .with_stride(3)
///     .with_grid(Some(10))
///     .with_dot_diameter(24);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Run detection on every n-th frame, counting from the first frame (index 0).
    /// Other frames are published unannotated.
    pub processing_stride: u64,
    /// Both endpoints of a bone must exceed this confidence for it to be drawn.
    pub bone_confidence: f32,
    /// A target joint must exceed this confidence for its dot to be drawn.
    pub dot_confidence: f32,
    /// Dot diameter in pixels.
    pub dot_diameter: u32,
    /// Bone stroke width in pixels.
    pub line_width: u32,
    /// Size of the diagnostic grid overlay, `None` to disable it.
    pub grid: Option<u32>,
    /// Joints, bones and colors for body skeletons.
    pub body_style: SkeletonStyle,
    /// Joints, bones and colors for hand skeletons.
    pub hand_style: SkeletonStyle,
    /// Frame rate assumed when a source does not report one.
    pub fallback_frame_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processing_stride: 6,
            bone_confidence: 0.3,
            dot_confidence: 0.5,
            dot_diameter: 40,
            line_width: 8,
            grid: None,
            body_style: SkeletonStyle::body(),
            hand_style: SkeletonStyle::hand(),
            fallback_frame_rate: 30.0,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values.
    ///
    /// # Returns
    ///
    /// * A new `PipelineConfig` instance with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the processing stride.
    ///
    /// # Arguments
    ///
    /// * `stride` - Detection runs on frames whose index is a multiple of this value.
    ///
    /// # Returns
    ///
    /// * The modified `PipelineConfig`.
    #[must_use]
    pub fn with_stride(mut self, stride: u64) -> Self {
        self.processing_stride = stride;
        self
    }

    /// Set the bone and dot confidence thresholds.
    ///
    /// # Arguments
    ///
    /// * `bone` - Minimum (exclusive) confidence for both bone endpoints.
    /// * `dot` - Minimum (exclusive) confidence for a joint dot.
    ///
    /// # Returns
    ///
    /// * The modified `PipelineConfig`.
    #[must_use]
    pub fn with_thresholds(mut self, bone: f32, dot: f32) -> Self {
        self.bone_confidence = bone;
        self.dot_confidence = dot;
        self
    }

    /// Set the dot diameter in pixels.
    #[must_use]
    pub fn with_dot_diameter(mut self, diameter: u32) -> Self {
        self.dot_diameter = diameter;
        self
    }

    /// Set the bone stroke width in pixels.
    #[must_use]
    pub fn with_line_width(mut self, width: u32) -> Self {
        self.line_width = width;
        self
    }

    /// Enable the `n x n` diagnostic grid, or disable it with `None`.
    #[must_use]
    pub fn with_grid(mut self, grid: Option<u32>) -> Self {
        self.grid = grid;
        self
    }

    /// Replace the body skeleton style.
    #[must_use]
    pub fn with_body_style(mut self, style: SkeletonStyle) -> Self {
        self.body_style = style;
        self
    }

    /// Replace the hand skeleton style.
    #[must_use]
    pub fn with_hand_style(mut self, style: SkeletonStyle) -> Self {
        self.hand_style = style;
        self
    }

    /// Set the frame rate used when a source reports none.
    #[must_use]
    pub fn with_fallback_frame_rate(mut self, fps: f64) -> Self {
        self.fallback_frame_rate = fps;
        self
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.processing_stride == 0 {
            return Err(OverlayError::ConfigError(
                "processing stride must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("bone confidence", self.bone_confidence),
            ("dot confidence", self.dot_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OverlayError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.dot_diameter == 0 || self.line_width == 0 {
            return Err(OverlayError::ConfigError(
                "dot diameter and line width must be positive".to_string(),
            ));
        }
        if self.grid == Some(0) {
            return Err(OverlayError::ConfigError(
                "grid size must be at least 1".to_string(),
            ));
        }
        if !self.fallback_frame_rate.is_finite() || self.fallback_frame_rate <= 0.0 {
            return Err(OverlayError::ConfigError(format!(
                "fallback frame rate must be positive, got {}",
                self.fallback_frame_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonKind;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.processing_stride, 6);
        assert!((config.bone_confidence - 0.3).abs() < f32::EPSILON);
        assert!((config.dot_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.dot_diameter, 40);
        assert_eq!(config.line_width, 8);
        assert_eq!(config.grid, None);
        assert_eq!(config.body_style.kind, SkeletonKind::Body);
        assert_eq!(config.hand_style.kind, SkeletonKind::Hand);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_stride(2)
            .with_thresholds(0.1, 0.2)
            .with_dot_diameter(10)
            .with_line_width(3)
            .with_grid(Some(10))
            .with_hand_style(SkeletonStyle::hand_fingertips());

        assert_eq!(config.processing_stride, 2);
        assert!((config.bone_confidence - 0.1).abs() < f32::EPSILON);
        assert!((config.dot_confidence - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.dot_diameter, 10);
        assert_eq!(config.line_width, 3);
        assert_eq!(config.grid, Some(10));
        assert_eq!(config.hand_style.bones.len(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PipelineConfig::new().with_stride(0).validate().is_err());
        assert!(PipelineConfig::new().with_thresholds(1.5, 0.5).validate().is_err());
        assert!(PipelineConfig::new().with_grid(Some(0)).validate().is_err());
        assert!(PipelineConfig::new().with_line_width(0).validate().is_err());
        assert!(
            PipelineConfig::new()
                .with_fallback_frame_rate(0.0)
                .validate()
                .is_err()
        );
    }
}
