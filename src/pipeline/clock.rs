//! Frame pacing statistics for the producer loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How many frames a statistics window spans before it is folded down.
const STATS_WINDOW: u64 = 100;

/// Frame clock for the producer loop
///
/// Counts frames and tracks how long each one took to render and stream,
/// so the average frame time reflects recent load rather than the whole
/// session. Every `STATS_WINDOW` frames the accumulated durations collapse
/// into a single carried-over sample.
///
/// # Thread Safety
///
/// The clock is thread-safe and can be cloned via Arc; all counters use
/// atomic operations.
#[derive(Clone)]
pub struct FrameClock {
    /// Instant the clock started
    base: Arc<Instant>,

    /// Total frames produced since start
    frame_count: Arc<AtomicU64>,

    /// Frames in the current statistics window
    window_count: Arc<AtomicU64>,

    /// Accumulated frame durations in the current window (microseconds)
    window_micros: Arc<AtomicU64>,
}

impl FrameClock {
    /// Create a new frame clock starting now
    pub fn new() -> Self {
        Self {
            base: Arc::new(Instant::now()),
            frame_count: Arc::new(AtomicU64::new(0)),
            window_count: Arc::new(AtomicU64::new(0)),
            window_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Time elapsed since the clock started
    pub fn uptime(&self) -> Duration {
        self.base.elapsed()
    }

    /// Total frames produced since start
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Record one produced frame and how long it took.
    ///
    /// Returns the new total frame count.
    pub fn record_frame(&self, took: Duration) -> u64 {
        let frame = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;

        if self.window_count.load(Ordering::Relaxed) >= STATS_WINDOW {
            // fold the window into one carried-over average sample
            let avg = self.average_frame_time();
            self.window_micros
                .store(avg.as_micros() as u64, Ordering::Relaxed);
            self.window_count.store(1, Ordering::Relaxed);
        }

        self.window_micros
            .fetch_add(took.as_micros() as u64, Ordering::Relaxed);
        self.window_count.fetch_add(1, Ordering::Relaxed);
        frame
    }

    /// Average duration of a frame over the current statistics window
    pub fn average_frame_time(&self) -> Duration {
        let count = self.window_count.load(Ordering::Relaxed);
        let micros = self.window_micros.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(micros / count)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("uptime", &self.uptime())
            .field("frame_count", &self.frame_count())
            .field("average_frame_time", &self.average_frame_time())
            .finish()
    }
}
