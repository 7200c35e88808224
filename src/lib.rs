// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Posture Overlay
//!
//! Frame pipeline that reads video frames, runs body and hand pose estimation on a
//! subsampled stream, draws skeleton overlays onto the processed frames and publishes
//! the result through a latest-frame slot to a display.
//!
//! ## Features
//!
//! - **Pluggable sources** - Movie files and cameras (`video`), image sequences, in-memory frames
//! - **Pluggable detectors** - Any [`PoseDetector`]; YOLO-pose ONNX models with the `onnx` feature
//! - **Concurrent detection** - Body and hand models run side by side on every processed frame
//! - **Latest-frame slot** - Producer and display never block each other; stale frames are dropped
//! - **Lifecycle events** - [`PipelineEvent`]s for every milestone and soft failure
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use posture_overlay::{
//!     FrameProcessor, NullDetector, Pipeline, PipelineConfig, SkeletonKind, SourceConfig,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::new().with_stride(6);
//!     let processor = FrameProcessor::new(
//!         config,
//!         Arc::new(NullDetector::new(SkeletonKind::Body)),
//!         Arc::new(NullDetector::new(SkeletonKind::Hand)),
//!     )?;
//!
//!     let mut pipeline = Pipeline::new(SourceConfig::image_sequence("frames/", 30.0), processor);
//!     let state = pipeline.run()?;
//!     println!(
//!         "{state}: {} frames in {:.1}s",
//!         pipeline.frame_count(),
//!         pipeline.elapsed_seconds()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Overlay the default body model on a movie and show it in a window
//! posture-overlay run --movie clip.mp4 --body-model yolo11n-pose.onnx --show
//!
//! # Headless run over a directory of frames with a 10x10 diagnostic grid
//! posture-overlay run --frames frames/ --fps 25 --grid 10
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`Pipeline`] lifecycle and the per-frame [`FrameProcessor`] |
//! | [`source`] | Frame sources ([`FrameSource`], [`SourceConfig`], [`MemorySource`]) |
//! | [`detector`] | [`PoseDetector`] trait and [`NullDetector`] |
//! | [`annotate`] | Skeleton drawing ([`Annotator`], [`SkeletonStyle`]) |
//! | [`skeleton`] | Joint vocabularies, bones and observations |
//! | [`slot`] | Latest-frame slot ([`SharedFrameState`]) |
//! | [`orientation`] | Preferred-transform resolution |
//! | [`events`] | [`PipelineEvent`] and [`EventSink`] |
//! | [`config`] | [`PipelineConfig`] |
//! | [`error`] | Error types ([`OverlayError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `visualize` | Real-time window display |
//! | `video` | Movie file and camera decoding |
//! | `onnx` | YOLO-pose detectors on ONNX Runtime |
//!
//! ## License
//!
//! This project is licensed under [AGPL-3.0](https://ultralytics.com/license).

// Modules
pub mod annotate;
pub mod config;
pub mod detector;
pub mod download;
pub mod error;
pub mod events;
pub mod frame;
pub mod logging;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod orientation;
pub mod pipeline;
pub mod skeleton;
pub mod slot;
pub mod source;
pub mod visualizer;

// Re-export main types for convenience
pub use annotate::{Annotator, Layer, SkeletonStyle};
pub use config::PipelineConfig;
pub use detector::{NullDetector, PoseDetector};
pub use error::{OverlayError, Result};
pub use events::{EventSink, PipelineEvent};
pub use frame::{Frame, PixelBuffer, PixelFormat};
pub use orientation::{AffineTransform, Orientation, Rotation, resolve_orientation};
pub use pipeline::{FrameProcessor, Pipeline, PipelineState, ProcessedFrame};
pub use skeleton::{
    BodyJoint, Bone, HandJoint, Joint, JointObservation, NormalizedPoint, SkeletonKind,
    SkeletonObservation,
};
pub use slot::{PipelineCounters, SharedFrameState, Snapshot};
#[cfg(feature = "video")]
pub use source::VideoSource;
pub use source::{
    FrameSource, ImageSequenceSource, MemorySource, SourceConfig, SourceKind, SourceMetadata,
    SourceOpener,
};

#[cfg(feature = "onnx")]
pub use onnx::{DetectorConfig, KeypointLayout, OnnxPoseDetector};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "posture-overlay");
    }
}
