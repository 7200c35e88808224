// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame processing pipeline.
//!
//! The [`Pipeline`] owns a reader thread that pulls frames from a source, runs pose
//! detection on every n-th frame, draws the overlay and publishes the result into a
//! [`SharedFrameState`]. Display code polls that state on its own schedule.
//!
//! ```text
//!  Idle ──open──▶ Opening ──▶ Ready ──start──▶ Running ──▶ Ended
//!                    │                            │
//!                    └────────────▶ Failed ◀──────┘
//! ```
//!
//! [`Pipeline::reset`] returns to `Idle` from any state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use image::RgbaImage;

use crate::annotate::{Annotator, Layer};
use crate::config::PipelineConfig;
use crate::detector::PoseDetector;
use crate::error::{OverlayError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::frame::{Frame, PixelBuffer};
use crate::orientation::{Orientation, resolve_orientation};
use crate::skeleton::SkeletonObservation;
use crate::slot::{PipelineCounters, SharedFrameState};
use crate::source::{FrameSource, SourceMetadata, SourceOpener};

/// Lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Opening,
    Ready,
    Running,
    Ended,
    Failed,
}

impl PipelineState {
    /// Whether the session is over, successfully or not.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Ended => "ended",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Output of [`FrameProcessor::process`].
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Frame to publish, annotated or passed through.
    pub frame: Frame,
    /// Whether the detectors ran on this frame.
    pub detected: bool,
    /// Body skeletons found.
    pub bodies: usize,
    /// Hand skeletons found.
    pub hands: usize,
}

impl ProcessedFrame {
    const fn passthrough(frame: Frame, detected: bool) -> Self {
        Self {
            frame,
            detected,
            bodies: 0,
            hands: 0,
        }
    }
}

/// Per-frame work: stride selection, detection, annotation and format conversion.
pub struct FrameProcessor {
    config: PipelineConfig,
    annotator: Annotator,
    body: Arc<dyn PoseDetector>,
    hand: Arc<dyn PoseDetector>,
    events: EventSink,
}

impl fmt::Debug for FrameProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProcessor")
            .field("config", &self.config)
            .field("annotator", &self.annotator)
            .finish_non_exhaustive()
    }
}

impl FrameProcessor {
    /// Create a processor with a default annotator for `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` is invalid.
    pub fn new(
        config: PipelineConfig,
        body: Arc<dyn PoseDetector>,
        hand: Arc<dyn PoseDetector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            annotator: Annotator::new(&config),
            config,
            body,
            hand,
            events: EventSink::new(),
        })
    }

    /// Replace the annotator, e.g. one with a font for grid labels.
    #[must_use]
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Report soft failures to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the frame at 0-based `index` of the session goes through detection.
    #[must_use]
    pub const fn should_process(&self, index: u64) -> bool {
        index % self.config.processing_stride == 0
    }

    /// Process the frame at 0-based `index` of the session.
    ///
    /// Never fails: detection and conversion errors are reported as events and the
    /// frame is passed through without overlay.
    pub fn process(&self, frame: Frame, index: u64) -> ProcessedFrame {
        if !self.should_process(index) {
            return ProcessedFrame::passthrough(frame, false);
        }

        let image = match frame.buffer.to_rgba() {
            Ok(image) => image,
            Err(e) => {
                self.events.emit(PipelineEvent::AnnotationFailed {
                    message: e.to_string(),
                });
                return ProcessedFrame::passthrough(frame, false);
            }
        };

        let (bodies, hands) = rayon::join(
            || self.detect(self.body.as_ref(), &image),
            || self.detect(self.hand.as_ref(), &image),
        );

        if bodies.is_empty() && hands.is_empty() && self.annotator.grid().is_none() {
            return ProcessedFrame::passthrough(frame, true);
        }

        let annotated = self.annotator.annotate_layers(
            &image,
            &[
                Layer::new(&bodies, &self.config.body_style),
                Layer::new(&hands, &self.config.hand_style),
            ],
        );
        let buffer = PixelBuffer::from_rgba(&annotated, frame.buffer.format());

        ProcessedFrame {
            frame: frame.with_buffer(buffer),
            detected: true,
            bodies: bodies.len(),
            hands: hands.len(),
        }
    }

    fn detect(&self, detector: &dyn PoseDetector, image: &RgbaImage) -> Vec<SkeletonObservation> {
        match detector.detect(image) {
            Ok(observations) => observations,
            Err(e) => {
                self.events.emit(PipelineEvent::DetectionFailed {
                    kind: detector.kind(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}

/// Handle to the reader thread of one session.
struct Worker {
    stop: Arc<AtomicBool>,
    start: Option<SyncSender<u64>>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Signal the reader to stop and let it wind down on its own.
    fn detach(self, status: &Mutex<PipelineState>) {
        // Held so the reader cannot record a final state after the stop.
        let _status = status.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop.store(true, Ordering::Release);
        drop(self.start);
    }
}

/// Everything the reader thread needs.
struct Reader {
    opener: Arc<dyn SourceOpener>,
    processor: Arc<FrameProcessor>,
    shared: Arc<SharedFrameState>,
    status: Arc<Mutex<PipelineState>>,
    events: EventSink,
    stop: Arc<AtomicBool>,
}

impl Reader {
    fn run(self, metadata_tx: SyncSender<Result<SourceMetadata>>, start_rx: Receiver<u64>) {
        let fallback = self.processor.config().fallback_frame_rate;
        let opened = self.opener.open().and_then(|mut source| {
            let mut metadata = source.metadata()?;
            if !(metadata.frame_rate.is_finite() && metadata.frame_rate > 0.0) {
                metadata.frame_rate = fallback;
            }
            Ok((source, metadata))
        });

        let (mut source, metadata) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                let _ = metadata_tx.send(Err(e));
                return;
            }
        };
        if metadata_tx.send(Ok(metadata)).is_err() {
            return;
        }

        // The sender is dropped when the pipeline resets before starting.
        let Ok(generation) = start_rx.recv() else {
            return;
        };
        self.read_frames(source.as_mut(), generation, metadata.frame_rate);
    }

    fn read_frames(&self, source: &mut dyn FrameSource, generation: u64, frame_rate: f64) {
        let mut index = 0u64;
        loop {
            if self.stopped() {
                return;
            }
            match source.read_next() {
                Ok(Some(frame)) => {
                    let processed = self.processor.process(frame, index);
                    index += 1;
                    if self.stopped()
                        || !self.shared.publish(
                            generation,
                            processed.frame,
                            processed.detected,
                            frame_rate,
                        )
                    {
                        return;
                    }
                }
                Ok(None) => {
                    if self.finish(PipelineState::Ended) {
                        self.events
                            .emit(PipelineEvent::ReaderCompleted { frames: index });
                    }
                    return;
                }
                Err(e) => {
                    if self.finish(PipelineState::Failed) {
                        self.events.emit(PipelineEvent::Failed {
                            message: e.to_string(),
                        });
                    }
                    return;
                }
            }
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Record the final state unless the session was reset meanwhile.
    fn finish(&self, state: PipelineState) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped() {
            return false;
        }
        *status = state;
        true
    }
}

fn set_state(status: &Mutex<PipelineState>, state: PipelineState) {
    *status.lock().unwrap_or_else(PoisonError::into_inner) = state;
}

/// Source, processing and shared output of one pose overlay session.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use posture_overlay::{
///     FrameProcessor, FrameSource, MemorySource, NullDetector, Pipeline, PipelineConfig,
///     PipelineState, PixelFormat, SkeletonKind,
/// };
///
/// let processor = FrameProcessor::new(
///     PipelineConfig::default(),
///     Arc::new(NullDetector::new(SkeletonKind::Body)),
///     Arc::new(NullDetector::new(SkeletonKind::Hand)),
/// )?;
/// let opener = || -> posture_overlay::Result<Box<dyn FrameSource>> {
///     Ok(Box::new(MemorySource::solid(64, 48, PixelFormat::Bgra8, [0, 0, 0, 255], 12, 30.0)))
/// };
/// let mut pipeline = Pipeline::new(opener, processor);
/// assert_eq!(pipeline.run()?, PipelineState::Ended);
/// assert_eq!(pipeline.frame_count(), 12);
/// # Ok::<(), posture_overlay::OverlayError>(())
/// ```
pub struct Pipeline {
    opener: Arc<dyn SourceOpener>,
    processor: Arc<FrameProcessor>,
    shared: Arc<SharedFrameState>,
    status: Arc<Mutex<PipelineState>>,
    events: EventSink,
    metadata: Option<SourceMetadata>,
    orientation: Orientation,
    worker: Option<Worker>,
}

impl Pipeline {
    /// Create an idle pipeline. Soft failures of `processor` are reported on the
    /// pipeline's event sink.
    pub fn new(opener: impl SourceOpener + 'static, processor: FrameProcessor) -> Self {
        let events = EventSink::new();
        Self {
            opener: Arc::new(opener),
            processor: Arc::new(processor.with_events(events.clone())),
            shared: Arc::new(SharedFrameState::new()),
            status: Arc::new(Mutex::new(PipelineState::Idle)),
            events,
            metadata: None,
            orientation: Orientation::default(),
            worker: None,
        }
    }

    /// Receive lifecycle events emitted from now on.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metadata of the open source, once `Ready`.
    #[must_use]
    pub const fn metadata(&self) -> Option<&SourceMetadata> {
        self.metadata.as_ref()
    }

    /// Display orientation of the open source.
    #[must_use]
    pub const fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Read-only handle for display threads.
    #[must_use]
    pub fn shared(&self) -> Arc<SharedFrameState> {
        Arc::clone(&self.shared)
    }

    /// Open the source on a new reader thread and wait for its metadata.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` unless the pipeline is `Idle`. Source and configuration
    /// failures move the pipeline to `Failed` and are returned.
    pub fn open(&mut self) -> Result<SourceMetadata> {
        let state = self.state();
        if state != PipelineState::Idle {
            return Err(OverlayError::ConfigError(format!(
                "cannot open a source while {state}"
            )));
        }

        set_state(&self.status, PipelineState::Opening);
        self.events.emit(PipelineEvent::Opening {
            source: self.opener.describe(),
        });

        let stop = Arc::new(AtomicBool::new(false));
        let (metadata_tx, metadata_rx) = mpsc::sync_channel(1);
        let (start_tx, start_rx) = mpsc::sync_channel(1);
        let reader = Reader {
            opener: Arc::clone(&self.opener),
            processor: Arc::clone(&self.processor),
            shared: Arc::clone(&self.shared),
            status: Arc::clone(&self.status),
            events: self.events.clone(),
            stop: Arc::clone(&stop),
        };

        let spawned = thread::Builder::new()
            .name("pipeline-reader".to_string())
            .spawn(move || reader.run(metadata_tx, start_rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e.into())),
        };

        match metadata_rx.recv() {
            Ok(Ok(metadata)) => {
                self.orientation = resolve_orientation(&metadata.transform);
                self.metadata = Some(metadata);
                self.worker = Some(Worker {
                    stop,
                    start: Some(start_tx),
                    handle,
                });
                self.events.emit(PipelineEvent::SourceOpened {
                    width: metadata.width,
                    height: metadata.height,
                    frame_rate: metadata.frame_rate,
                    orientation: self.orientation,
                });
                set_state(&self.status, PipelineState::Ready);
                self.events.emit(PipelineEvent::ReaderReady);
                Ok(metadata)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(self.fail(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(self.fail(OverlayError::SourceError(
                    "reader thread exited before the source opened".to_string(),
                )))
            }
        }
    }

    /// Start pulling frames. Counters restart from zero.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` unless the pipeline is `Ready`.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != PipelineState::Ready {
            return Err(OverlayError::ConfigError(format!(
                "cannot start while {state}"
            )));
        }
        let Some(start) = self.worker.as_mut().and_then(|worker| worker.start.take()) else {
            return Err(OverlayError::ConfigError(
                "reader thread is not waiting to start".to_string(),
            ));
        };

        let generation = self.shared.begin_session();
        set_state(&self.status, PipelineState::Running);
        self.events.emit(PipelineEvent::Started);
        if start.send(generation).is_err() {
            return Err(self.fail(OverlayError::SourceError(
                "reader thread exited before starting".to_string(),
            )));
        }
        Ok(())
    }

    /// Open, start and wait for the session to finish.
    ///
    /// # Errors
    ///
    /// Returns the error of [`open`](Self::open) or [`start`](Self::start).
    pub fn run(&mut self) -> Result<PipelineState> {
        self.open()?;
        self.start()?;
        Ok(self.wait())
    }

    /// Block until the reader thread finishes and return the final state.
    ///
    /// Returns immediately unless a session was started.
    pub fn wait(&mut self) -> PipelineState {
        // A Ready reader is parked on the start signal.
        if matches!(self.state(), PipelineState::Idle | PipelineState::Ready) {
            return self.state();
        }
        if let Some(worker) = self.worker.take()
            && worker.handle.join().is_err()
        {
            set_state(&self.status, PipelineState::Failed);
            self.events.emit(PipelineEvent::Failed {
                message: "reader thread panicked".to_string(),
            });
        }
        self.state()
    }

    /// Stop the session, clear the shared frame and counters, and return to `Idle`.
    ///
    /// Does not wait for the reader thread. A detection still in flight finishes in
    /// the background and its result is discarded.
    pub fn reset(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.detach(&self.status);
        }
        self.shared.clear();
        self.metadata = None;
        self.orientation = Orientation::default();
        set_state(&self.status, PipelineState::Idle);
        self.events.emit(PipelineEvent::Reset);
    }

    fn fail(&self, error: OverlayError) -> OverlayError {
        set_state(&self.status, PipelineState::Failed);
        self.events.emit(PipelineEvent::Failed {
            message: error.to_string(),
        });
        error
    }

    /// Latest published frame.
    #[must_use]
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.shared.current_frame()
    }

    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        self.shared.counters()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count()
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.shared.elapsed_seconds()
    }

    #[must_use]
    pub fn video_seconds(&self) -> f64 {
        self.shared.video_seconds()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.detach(&self.status);
        }
    }
}
