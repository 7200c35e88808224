// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pipeline lifecycle events.
//!
//! Every event is printed through the crate logging macros and forwarded to any
//! number of subscribers over `std::sync::mpsc` channels.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::orientation::Orientation;
use crate::skeleton::SkeletonKind;
use crate::{error, success, verbose, warn};

/// Milestones and soft failures of a pipeline session.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A source is being opened.
    Opening { source: String },
    /// The source is open and its metadata is known.
    SourceOpened {
        width: u32,
        height: u32,
        frame_rate: f64,
        orientation: Orientation,
    },
    /// The reader is ready to start.
    ReaderReady,
    /// The worker started pulling frames.
    Started,
    /// A detector failed on one frame; the frame was published without overlay.
    DetectionFailed { kind: SkeletonKind, message: String },
    /// A frame could not be converted for drawing; it was published as-is.
    AnnotationFailed { message: String },
    /// The source reached its end.
    ReaderCompleted { frames: u64 },
    /// The session ended with a fatal error.
    Failed { message: String },
    /// The pipeline was reset to idle.
    Reset,
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening { source } => write!(f, "Opening {source}"),
            Self::SourceOpened {
                width,
                height,
                frame_rate,
                orientation,
            } => write!(
                f,
                "Source opened: {width}x{height} at {frame_rate:.2} fps, rotated {}°{}",
                orientation.rotation.degrees(),
                if orientation.is_portrait {
                    " (portrait)"
                } else {
                    ""
                }
            ),
            Self::ReaderReady => write!(f, "Reader ready"),
            Self::Started => write!(f, "Reader started"),
            Self::DetectionFailed { kind, message } => {
                write!(f, "{kind} detection failed: {message}")
            }
            Self::AnnotationFailed { message } => write!(f, "Annotation skipped: {message}"),
            Self::ReaderCompleted { frames } => write!(f, "Reader completed after {frames} frames"),
            Self::Failed { message } => write!(f, "Reader failed: {message}"),
            Self::Reset => write!(f, "Pipeline reset"),
        }
    }
}

/// Fan-out of [`PipelineEvent`]s to subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    subscribers: Arc<Mutex<Vec<Sender<PipelineEvent>>>>,
}

impl EventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Log `event` and deliver it. Subscribers whose receiver was dropped are removed.
    pub fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::DetectionFailed { .. } | PipelineEvent::AnnotationFailed { .. } => {
                warn!("{event}");
            }
            PipelineEvent::Failed { .. } => error!("{event}"),
            PipelineEvent::ReaderCompleted { .. } => {
                if crate::logging::is_verbose() {
                    success!("{event}");
                }
            }
            _ => verbose!("{event}"),
        }

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_events() {
        let sink = EventSink::new();
        let first = sink.subscribe();
        let second = sink.subscribe();
        sink.emit(PipelineEvent::ReaderReady);

        assert_eq!(first.try_recv().ok(), Some(PipelineEvent::ReaderReady));
        assert_eq!(second.try_recv().ok(), Some(PipelineEvent::ReaderReady));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let sink = EventSink::new();
        drop(sink.subscribe());
        let live = sink.subscribe();
        sink.emit(PipelineEvent::Reset);
        assert_eq!(sink.subscribers.lock().unwrap().len(), 1);
        assert_eq!(live.try_recv().ok(), Some(PipelineEvent::Reset));
    }

    #[test]
    fn test_display() {
        let event = PipelineEvent::SourceOpened {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            orientation: Orientation::default(),
        };
        assert_eq!(event.to_string(), "Source opened: 1920x1080 at 30.00 fps, rotated 0°");
        assert_eq!(
            PipelineEvent::ReaderCompleted { frames: 12 }.to_string(),
            "Reader completed after 12 frames"
        );
    }
}
