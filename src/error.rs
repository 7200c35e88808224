// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the overlay pipeline.

use std::fmt;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Main error type for the overlay pipeline.
///
/// Source and configuration errors end a session; detection and annotation errors
/// only cost the overlay of a single frame. See [`OverlayError::is_fatal`].
#[derive(Debug)]
pub enum OverlayError {
    /// Source could not be opened, has no video track, or failed to decode.
    SourceError(String),
    /// Pose detection failed for a frame.
    DetectionError(String),
    /// Frame could not be converted to or from a drawable image.
    AnnotationError(String),
    /// Invalid configuration or missing resource.
    ConfigError(String),
    /// Error processing images.
    ImageError(String),
    /// IO error (file not found, permission denied, etc.).
    IoError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
    /// Error loading a pose model.
    ModelLoadError(String),
    /// Visualizer error.
    VisualizerError(String),
    /// Feature not enabled.
    FeatureNotEnabled(String),
}

impl OverlayError {
    /// Whether this error ends the current pipeline session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceError(_) | Self::ConfigError(_))
    }
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceError(msg) => write!(f, "Source error: {msg}"),
            Self::DetectionError(msg) => write!(f, "Detection error: {msg}"),
            Self::AnnotationError(msg) => write!(f, "Annotation error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::VisualizerError(msg) => write!(f, "Visualizer error: {msg}"),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
        }
    }
}

impl std::error::Error for OverlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for OverlayError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
