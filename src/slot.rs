// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Latest-frame slot shared between the pipeline worker and display consumers.
//!
//! The slot holds at most one frame together with the counters that were current when
//! it was published. Publishing replaces both in a single critical section, so a
//! reader never sees a frame paired with another frame's counters. There is no
//! queue: frames the display did not pick up in time are simply overwritten.
//!
//! Every session gets a generation number. A reset bumps it, and publishes carrying
//! an older generation are rejected so late results from a stopped session cannot
//! reappear.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::frame::Frame;

/// Running counters of a pipeline session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineCounters {
    /// Frames read from the source and published.
    pub frame_count: u64,
    /// Frames that went through pose detection.
    pub detections_run: u64,
    /// Media time covered so far: `frame_count / frame_rate` seconds.
    pub video_time: f64,
    /// Wall-clock seconds since the session started, at the last publish.
    pub elapsed_time: f64,
    /// `elapsed_time` as of the publish before the last one.
    pub previous_elapsed_time: f64,
}

impl PipelineCounters {
    /// Wall-clock seconds spent on the most recent frame.
    #[must_use]
    pub fn last_frame_seconds(&self) -> f64 {
        self.elapsed_time - self.previous_elapsed_time
    }
}

/// What a reader sees: the latest frame and its counters.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub frame: Option<Arc<Frame>>,
    pub counters: PipelineCounters,
}

#[derive(Debug, Default)]
struct SlotInner {
    generation: u64,
    snapshot: Snapshot,
    started: Option<Instant>,
}

/// Single-writer, many-reader latest-value cell.
#[derive(Debug, Default)]
pub struct SharedFrameState {
    inner: Mutex<SlotInner>,
}

impl SharedFrameState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        // The guarded data is replaced wholesale, so a poisoned lock still holds a
        // consistent value.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session: zero the counters, empty the slot and start the clock.
    /// Returns the generation publishers must present.
    pub fn begin_session(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.snapshot = Snapshot::default();
        inner.started = Some(Instant::now());
        inner.generation
    }

    /// Empty the slot, zero the counters and invalidate the current session.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.snapshot = Snapshot::default();
        inner.started = None;
    }

    /// Publish `frame` and advance the counters.
    ///
    /// `detected` marks frames that went through pose detection. Returns `false`, and
    /// leaves the slot untouched, if `generation` is not the current session.
    pub fn publish(&self, generation: u64, frame: Frame, detected: bool, frame_rate: f64) -> bool {
        let frame = Arc::new(frame);
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }

        let elapsed = inner
            .started
            .map_or(0.0, |started| started.elapsed().as_secs_f64());
        let counters = &mut inner.snapshot.counters;
        counters.frame_count += 1;
        if detected {
            counters.detections_run += 1;
        }
        counters.video_time = if frame_rate > 0.0 {
            counters.frame_count as f64 / frame_rate
        } else {
            0.0
        };
        counters.previous_elapsed_time = counters.elapsed_time;
        counters.elapsed_time = elapsed;
        inner.snapshot.frame = Some(frame);
        true
    }

    /// Copy of the latest frame and counters, taken atomically.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    /// Current session generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.lock().snapshot.frame.clone()
    }

    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        self.lock().snapshot.counters
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.counters().frame_count
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.counters().elapsed_time
    }

    #[must_use]
    pub fn video_seconds(&self) -> f64 {
        self.counters().video_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelBuffer, PixelFormat};
    use std::time::Duration;

    fn frame(index: u64) -> Frame {
        let shade = (index % 256) as u8;
        Frame::new(
            PixelBuffer::filled(2, 2, PixelFormat::Rgba8, [shade, shade, shade, 255]),
            Duration::from_millis(index * 40),
            index,
        )
    }

    #[test]
    fn test_latest_value_wins() {
        let slot = SharedFrameState::new();
        let generation = slot.begin_session();
        assert!(slot.publish(generation, frame(0), true, 25.0));
        assert!(slot.publish(generation, frame(1), false, 25.0));

        let snapshot = slot.snapshot();
        assert_eq!(snapshot.frame.map(|f| f.index), Some(1));
        assert_eq!(snapshot.counters.frame_count, 2);
        assert_eq!(snapshot.counters.detections_run, 1);
        assert!((snapshot.counters.video_time - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let slot = SharedFrameState::new();
        let old = slot.begin_session();
        slot.clear();
        assert!(!slot.publish(old, frame(0), true, 30.0));
        assert!(slot.current_frame().is_none());
        assert_eq!(slot.frame_count(), 0);
    }

    #[test]
    fn test_begin_session_resets_counters() {
        let slot = SharedFrameState::new();
        let first = slot.begin_session();
        slot.publish(first, frame(0), true, 30.0);
        let second = slot.begin_session();
        assert_ne!(first, second);
        assert_eq!(slot.counters(), PipelineCounters::default());
        assert!(slot.current_frame().is_none());
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let slot = SharedFrameState::new();
        let generation = slot.begin_session();
        slot.publish(generation, frame(0), true, 30.0);
        std::thread::sleep(Duration::from_millis(5));
        slot.publish(generation, frame(1), false, 30.0);
        let counters = slot.counters();
        assert!(counters.elapsed_time >= counters.previous_elapsed_time);
        assert!(counters.last_frame_seconds() > 0.0);
        assert!((slot.video_seconds() - 2.0 / 30.0).abs() < 1e-9);
    }
}
