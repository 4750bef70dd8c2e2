//! Health metrics for the streaming session

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Health metrics for a streaming session
///
/// Tracks counters the operator-facing layer uses to decide whether the
/// whole process needs a restart. All fields use atomic operations for
/// thread-safe access.
pub struct StreamHealth {
    /// Frames written to the transcoder pipe
    pub frames_streamed: AtomicU64,

    /// Frames discarded while a reconnect was in flight
    pub frames_dropped: AtomicU64,

    /// Broken-pipe failures on the transcoder stdin
    pub pipe_errors: AtomicU64,

    /// Write failures other than a broken pipe
    pub write_errors: AtomicU64,

    /// Reconnect attempts entered (successful or not)
    pub reconnects: AtomicU64,

    /// Raw bytes written to the transcoder pipe
    pub bytes_streamed: AtomicU64,

    /// Timestamp (Unix microseconds) of the last frame written
    pub last_frame_time: AtomicU64,
}

impl StreamHealth {
    pub fn new() -> Self {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        Self {
            frames_streamed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            pipe_errors: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            bytes_streamed: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros),
        }
    }

    /// Record a frame successfully written to the pipe
    pub fn record_frame(&self, size: usize) {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        self.last_frame_time.store(now_micros, Ordering::Relaxed);
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
        self.bytes_streamed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Record a frame dropped during reconnection
    pub fn record_frame_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broken-pipe failure
    pub fn record_pipe_error(&self) {
        self.pipe_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write failure that was surfaced to the caller
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record entry into a reconnect attempt
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_streamed(&self) -> u64 {
        self.frames_streamed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn pipe_errors(&self) -> u64 {
        self.pipe_errors.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn bytes_streamed(&self) -> u64 {
        self.bytes_streamed.load(Ordering::Relaxed)
    }

    /// Get the timestamp of the last written frame (Unix microseconds)
    pub fn last_frame_time(&self) -> u64 {
        self.last_frame_time.load(Ordering::Relaxed)
    }

    /// Calculate the frame drop rate as a percentage
    pub fn frame_drop_rate(&self) -> f64 {
        let drops = self.frames_dropped();
        let streamed = self.frames_streamed();
        if streamed == 0 {
            return 0.0;
        }
        (drops as f64 / streamed as f64) * 100.0
    }

    /// Check if the pipe has stalled (no frames written for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_frame = self.last_frame_time();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        let elapsed_micros = now.saturating_sub(last_frame);
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_streamed: self.frames_streamed(),
            frames_dropped: self.frames_dropped(),
            pipe_errors: self.pipe_errors(),
            write_errors: self.write_errors(),
            reconnects: self.reconnects(),
            bytes_streamed: self.bytes_streamed(),
            frame_drop_rate: self.frame_drop_rate(),
        }
    }
}

impl Default for StreamHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub frames_streamed: u64,
    pub frames_dropped: u64,
    pub pipe_errors: u64,
    pub write_errors: u64,
    pub reconnects: u64,
    pub bytes_streamed: u64,
    pub frame_drop_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} frames ({} drops, {:.2}%), {} pipe errors, {} write errors, {} reconnects, {} bytes",
            self.frames_streamed,
            self.frames_dropped,
            self.frame_drop_rate,
            self.pipe_errors,
            self.write_errors,
            self.reconnects,
            self.bytes_streamed
        )
    }
}
