// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! End-to-end pipeline runs over synthetic sources and scripted detectors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use posture_overlay::visualizer::Color;
use posture_overlay::{
    AffineTransform, BodyJoint, Frame, FrameProcessor, FrameSource, HandJoint, MemorySource,
    NullDetector,
    OverlayError, PipelineConfig, Pipeline, PipelineEvent, PipelineState, PixelBuffer,
    PixelFormat, PoseDetector, Result, Rotation, SharedFrameState, SkeletonKind,
    SkeletonObservation, SourceConfig, SourceMetadata,
};

/// Body detector that counts calls and reports one subject with both shoulders.
#[derive(Default)]
struct CountingBody {
    calls: AtomicUsize,
}

impl PoseDetector for CountingBody {
    fn kind(&self) -> SkeletonKind {
        SkeletonKind::Body
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            SkeletonObservation::new(SkeletonKind::Body)
                .with_joint(BodyJoint::LeftShoulder, 0.25, 0.5, 0.9)
                .with_joint(BodyJoint::RightShoulder, 0.75, 0.5, 0.9),
        ])
    }
}

/// Hand detector reporting a wrist near the top edge.
struct WristHand;

impl PoseDetector for WristHand {
    fn kind(&self) -> SkeletonKind {
        SkeletonKind::Hand
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        Ok(vec![
            SkeletonObservation::new(SkeletonKind::Hand)
                .with_joint(HandJoint::Wrist, 0.5, 0.875, 0.9),
        ])
    }
}

struct FailingDetector(SkeletonKind);

impl PoseDetector for FailingDetector {
    fn kind(&self) -> SkeletonKind {
        self.0
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        Err(OverlayError::DetectionError("model unavailable".to_string()))
    }
}

/// Source that never ends, pacing frames by `delay`.
struct EndlessSource {
    delay: Duration,
    next: u64,
}

impl FrameSource for EndlessSource {
    fn metadata(&mut self) -> Result<SourceMetadata> {
        Ok(SourceMetadata {
            width: 32,
            height: 24,
            frame_rate: 30.0,
            transform: AffineTransform::IDENTITY,
        })
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        thread::sleep(self.delay);
        let index = self.next;
        self.next += 1;
        Ok(Some(Frame::new(
            PixelBuffer::filled(32, 24, PixelFormat::Rgba8, [0, 0, 0, 255]),
            Duration::from_secs_f64(index as f64 / 30.0),
            index,
        )))
    }
}

/// Source whose decoder breaks after `good` frames.
struct BrokenAfter {
    good: u64,
    inner: MemorySource,
}

impl FrameSource for BrokenAfter {
    fn metadata(&mut self) -> Result<SourceMetadata> {
        self.inner.metadata()
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        if self.good == 0 {
            return Err(OverlayError::SourceError("decode failed".to_string()));
        }
        self.good -= 1;
        self.inner.read_next()
    }
}

fn null_processor(config: PipelineConfig) -> FrameProcessor {
    FrameProcessor::new(
        config,
        Arc::new(NullDetector::new(SkeletonKind::Body)),
        Arc::new(NullDetector::new(SkeletonKind::Hand)),
    )
    .unwrap()
}

fn solid_opener(count: u64) -> impl Fn() -> Result<Box<dyn FrameSource>> + Send + Sync {
    move || -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(MemorySource::solid(
            64,
            48,
            PixelFormat::Bgra8,
            [0, 0, 0, 255],
            count,
            30.0,
        )))
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_detection_runs_on_every_sixth_frame() {
    for (frames, expected) in [(1u64, 1usize), (6, 1), (7, 2), (12, 2), (13, 3), (30, 5)] {
        let body = Arc::new(CountingBody::default());
        let processor = FrameProcessor::new(
            PipelineConfig::default(),
            Arc::clone(&body) as Arc<dyn PoseDetector>,
            Arc::new(NullDetector::new(SkeletonKind::Hand)),
        )
        .unwrap();

        let mut pipeline = Pipeline::new(solid_opener(frames), processor);
        assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);
        assert_eq!(body.calls.load(Ordering::SeqCst), expected, "{frames} frames");

        let counters = pipeline.counters();
        assert_eq!(counters.frame_count, frames);
        assert_eq!(counters.detections_run, expected as u64);
    }
}

#[test]
fn test_published_frames_keep_source_format() {
    let body = Arc::new(CountingBody::default());
    let processor = FrameProcessor::new(
        PipelineConfig::default().with_stride(1),
        body,
        Arc::new(NullDetector::new(SkeletonKind::Hand)),
    )
    .unwrap();

    let mut pipeline = Pipeline::new(solid_opener(1), processor);
    assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);

    let frame = pipeline.current_frame().unwrap();
    assert_eq!(frame.buffer.format(), PixelFormat::Bgra8);
    assert_eq!((frame.width(), frame.height()), (64, 48));

    // Left shoulder at (0.25, 0.5) of a 64x48 frame.
    let image = frame.buffer.to_rgba().unwrap();
    assert_eq!(image.get_pixel(16, 24), &Color::GREEN.to_rgba());
}

#[test]
fn test_body_and_hand_share_one_published_frame() {
    let config = PipelineConfig::default()
        .with_stride(1)
        .with_dot_diameter(6)
        .with_line_width(2);
    let processor = FrameProcessor::new(
        config,
        Arc::new(CountingBody::default()),
        Arc::new(WristHand),
    )
    .unwrap();

    let mut pipeline = Pipeline::new(solid_opener(1), processor);
    assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);

    let image = pipeline.current_frame().unwrap().buffer.to_rgba().unwrap();
    // Left shoulder at (0.25, 0.5), wrist at (0.5, 0.875) of a 64x48 frame.
    assert_eq!(image.get_pixel(16, 24), &Color::GREEN.to_rgba());
    assert_eq!(image.get_pixel(32, 6), &Color::ORANGE.to_rgba());
    assert_eq!(pipeline.counters().detections_run, 1);
}

#[test]
fn test_lifecycle_events_in_order() {
    let mut pipeline = Pipeline::new(solid_opener(4), null_processor(PipelineConfig::default()));
    let events = pipeline.subscribe();
    assert_eq!(pipeline.state(), PipelineState::Idle);

    pipeline.open().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Ready);
    pipeline.start().unwrap();
    assert_eq!(pipeline.wait(), PipelineState::Ended);

    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 5, "{received:?}");
    assert!(matches!(received[0], PipelineEvent::Opening { .. }));
    assert!(matches!(
        received[1],
        PipelineEvent::SourceOpened {
            width: 64,
            height: 48,
            ..
        }
    ));
    assert!(matches!(received[2], PipelineEvent::ReaderReady));
    assert!(matches!(received[3], PipelineEvent::Started));
    assert!(matches!(received[4], PipelineEvent::ReaderCompleted { frames: 4 }));
}

#[test]
fn test_reset_after_42_frames() {
    let mut pipeline = Pipeline::new(solid_opener(42), null_processor(PipelineConfig::default()));
    assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);
    assert_eq!(pipeline.frame_count(), 42);
    assert!(pipeline.current_frame().is_some());

    let events = pipeline.subscribe();
    pipeline.reset();
    assert_eq!(pipeline.frame_count(), 0);
    assert!(pipeline.current_frame().is_none());
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.elapsed_seconds().abs() < f64::EPSILON);
    assert!(pipeline.video_seconds().abs() < f64::EPSILON);

    pipeline.open().unwrap();
    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert!(matches!(received[0], PipelineEvent::Reset));
    assert!(matches!(received[1], PipelineEvent::Opening { .. }));
    assert_eq!(pipeline.state(), PipelineState::Ready);

    pipeline.start().unwrap();
    assert_eq!(pipeline.wait(), PipelineState::Ended);
    assert_eq!(pipeline.frame_count(), 42);
}

#[test]
fn test_reset_while_running() {
    let opener = || -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(EndlessSource {
            delay: Duration::from_millis(1),
            next: 0,
        }))
    };
    let mut pipeline = Pipeline::new(opener, null_processor(PipelineConfig::default()));
    pipeline.open().unwrap();
    pipeline.start().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    let shared = pipeline.shared();
    assert!(wait_for(Duration::from_secs(10), || shared.frame_count() >= 42));

    pipeline.reset();
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.frame_count(), 0);
    assert!(pipeline.current_frame().is_none());

    // Frames the old reader still produces are rejected.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(shared.frame_count(), 0);
}

/// Body detector that takes `delay` per call and flags when it has been entered.
struct SlowBody {
    delay: Duration,
    entered: AtomicUsize,
}

impl PoseDetector for SlowBody {
    fn kind(&self) -> SkeletonKind {
        SkeletonKind::Body
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<SkeletonObservation>> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(vec![
            SkeletonObservation::new(SkeletonKind::Body)
                .with_joint(BodyJoint::LeftShoulder, 0.5, 0.5, 0.9),
        ])
    }
}

#[test]
fn test_reset_does_not_wait_for_slow_detection() {
    let body = Arc::new(SlowBody {
        delay: Duration::from_millis(800),
        entered: AtomicUsize::new(0),
    });
    let processor = FrameProcessor::new(
        PipelineConfig::default().with_stride(1),
        Arc::clone(&body) as Arc<dyn PoseDetector>,
        Arc::new(NullDetector::new(SkeletonKind::Hand)),
    )
    .unwrap();
    let mut pipeline = Pipeline::new(solid_opener(3), processor);
    let events = pipeline.subscribe();
    pipeline.open().unwrap();
    pipeline.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        body.entered.load(Ordering::SeqCst) > 0
    }));

    let started = Instant::now();
    pipeline.reset();
    assert!(started.elapsed() < Duration::from_millis(400), "{:?}", started.elapsed());
    assert_eq!(pipeline.state(), PipelineState::Idle);

    // The detection completes in the background without touching the reset pipeline.
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.frame_count(), 0);
    assert!(pipeline.current_frame().is_none());
    assert_eq!(body.entered.load(Ordering::SeqCst), 1);
    assert!(
        !events
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::ReaderCompleted { .. }))
    );
}

#[test]
fn test_source_open_failure() {
    let opener = || -> Result<Box<dyn FrameSource>> {
        Err(OverlayError::SourceError("no video track".to_string()))
    };
    let mut pipeline = Pipeline::new(opener, null_processor(PipelineConfig::default()));
    let events = pipeline.subscribe();

    let err = pipeline.open().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.current_frame().is_none());
    assert!(
        events
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::Failed { .. }))
    );
}

#[test]
fn test_decode_failure_mid_stream() {
    let opener = || -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(BrokenAfter {
            good: 3,
            inner: MemorySource::solid(16, 16, PixelFormat::Rgb8, [0, 0, 0, 255], 10, 25.0),
        }))
    };
    let mut pipeline = Pipeline::new(opener, null_processor(PipelineConfig::default()));
    assert_eq!(pipeline.run().unwrap(), PipelineState::Failed);
    assert_eq!(pipeline.frame_count(), 3);
    assert!(pipeline.current_frame().is_some());
}

#[test]
fn test_detection_failure_publishes_unannotated_frame() {
    let processor = FrameProcessor::new(
        PipelineConfig::default().with_stride(1),
        Arc::new(FailingDetector(SkeletonKind::Body)),
        Arc::new(FailingDetector(SkeletonKind::Hand)),
    )
    .unwrap();
    let mut pipeline = Pipeline::new(solid_opener(2), processor);
    let events = pipeline.subscribe();

    assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);
    assert_eq!(pipeline.frame_count(), 2);

    let frame = pipeline.current_frame().unwrap();
    let expected = PixelBuffer::filled(64, 48, PixelFormat::Bgra8, [0, 0, 0, 255]);
    assert_eq!(frame.buffer, expected);

    let failures = events
        .try_iter()
        .filter(|e| matches!(e, PipelineEvent::DetectionFailed { .. }))
        .count();
    assert_eq!(failures, 4);
}

#[test]
fn test_orientation_resolved_on_open() {
    let opener = || -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(
            MemorySource::solid(64, 48, PixelFormat::Rgba8, [0, 0, 0, 255], 1, 30.0)
                .with_transform(AffineTransform::rotation(Rotation::Right)),
        ))
    };
    let mut pipeline = Pipeline::new(opener, null_processor(PipelineConfig::default()));
    let metadata = pipeline.open().unwrap();
    assert_eq!(metadata.display_size(), (48, 64));

    let orientation = pipeline.orientation();
    assert_eq!(orientation.rotation, Rotation::Right);
    assert!(orientation.is_portrait);
}

#[test]
fn test_image_sequence_source() {
    let dir = std::env::temp_dir().join(format!("posture-overlay-seq-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..3 {
        RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 255]))
            .save(dir.join(format!("frame_{i:03}.png")))
            .unwrap();
    }

    let config = SourceConfig::image_sequence(&dir, 10.0);
    config.validate().unwrap();
    let mut pipeline = Pipeline::new(config, null_processor(PipelineConfig::default()));
    assert_eq!(pipeline.run().unwrap(), PipelineState::Ended);
    assert_eq!(pipeline.frame_count(), 3);
    assert!((pipeline.video_seconds() - 0.3).abs() < 1e-9);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_movie_is_config_error() {
    let err = SourceConfig::movie("/definitely/not/here.mp4")
        .validate()
        .unwrap_err();
    assert!(matches!(err, OverlayError::ConfigError(_)));
}

#[test]
fn test_slot_readers_never_see_torn_frames() {
    const PUBLISHES: u64 = 2_000;
    const READERS: usize = 4;

    let shared = Arc::new(SharedFrameState::new());
    let generation = shared.begin_session();

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let mut last_count = 0;
                loop {
                    let snapshot = shared.snapshot();
                    if let Some(frame) = &snapshot.frame {
                        // Frame `i` is published as the (i + 1)th frame.
                        assert_eq!(frame.index + 1, snapshot.counters.frame_count);
                        let value = (frame.index % 251) as u8;
                        assert!(frame.buffer.data().iter().all(|&b| b == value));
                    }
                    assert!(snapshot.counters.frame_count >= last_count);
                    last_count = snapshot.counters.frame_count;
                    if last_count == PUBLISHES {
                        break;
                    }
                }
            })
        })
        .collect();

    for index in 0..PUBLISHES {
        let value = (index % 251) as u8;
        let buffer = PixelBuffer::filled(8, 8, PixelFormat::Rgb8, [value, value, value, 255]);
        assert!(shared.publish(generation, Frame::new(buffer, Duration::ZERO, index), false, 30.0));
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(shared.frame_count(), PUBLISHES);
}

#[test]
fn test_stale_generation_is_rejected() {
    let shared = SharedFrameState::new();
    let old = shared.begin_session();
    shared.clear();
    let frame = Frame::new(
        PixelBuffer::filled(2, 2, PixelFormat::Rgb8, [0, 0, 0, 255]),
        Duration::ZERO,
        0,
    );
    assert!(!shared.publish(old, frame, true, 30.0));
    assert_eq!(shared.frame_count(), 0);
    assert!(shared.current_frame().is_none());
}
