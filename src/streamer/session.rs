//! Resilient streaming session
//!
//! Owns the transcoder subprocess and keeps the outbound stream alive: a
//! broken stdin pipe hands off to a detached reconnect task while the
//! producer keeps its cadence, dropping frames until a new process
//! generation is up. Sustained failure trips a rolling cooldown budget and
//! aborts the session for good.

use crate::config::StreamConfig;
use crate::pipeline::{SessionState, StreamHealth};
use crate::streamer::FrameStreamer;
use crate::streamer::error::StreamError;
use crate::streamer::transcoder::{FfmpegLauncher, Transcoder, TranscoderLauncher};
use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Rolling error-accumulation window.
///
/// Every reconnect entry pushes the deadline one penalty further into the
/// future; enough idle time lets it fall back to "now" again.
struct Cooldown {
    deadline: Instant,
}

impl Cooldown {
    /// The later of "now" and the current deadline.
    fn floor(&self, now: Instant) -> Instant {
        if now < self.deadline { self.deadline } else { now }
    }
}

struct Shared {
    config: StreamConfig,
    launcher: Box<dyn TranscoderLauncher>,

    /// Single authoritative handle to the live transcoder generation.
    /// Taking it out of the Option is the only way to tear one down, so
    /// each generation is closed exactly once.
    transcoder: Mutex<Option<Transcoder>>,

    /// Serializes reconnect attempts and guards the cooldown deadline.
    /// Held for the whole attempt; a concurrent trigger must be rejected
    /// immediately, never queued.
    reconnect: Mutex<Cooldown>,

    /// Lifecycle state, guarded for cheap per-frame reads.
    state: std::sync::Mutex<SessionState>,

    health: Arc<StreamHealth>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn transition_to(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap();
        if state.can_transition_to(&next) {
            *state = next;
        } else {
            warn!("invalid session state transition: {state} -> {next}");
        }
    }

    /// Replace the dead transcoder generation with a fresh one.
    ///
    /// Entry is single-flight: if an attempt already holds the lock, this
    /// trigger is dropped with `AlreadyReconnecting`. The cooldown
    /// deadline is extended on every entry, and once it runs further than
    /// the ceiling beyond "now" the session aborts instead of retrying.
    async fn reconnect(&self) -> Result<(), StreamError> {
        let Ok(mut cooldown) = self.reconnect.try_lock() else {
            return Err(StreamError::AlreadyReconnecting);
        };

        if self.state().is_aborted() {
            return Err(StreamError::Aborted);
        }
        self.transition_to(SessionState::Reconnecting {
            since: Instant::now(),
        });

        let now = Instant::now();
        cooldown.deadline = cooldown.floor(now) + self.config.reconnect_penalty;
        if cooldown.deadline > now + self.config.reconnect_ceiling {
            self.transition_to(SessionState::Aborted);
            return Err(StreamError::Aborted);
        }
        self.health.record_reconnect();

        // tear down the dead generation before spawning the next one
        if let Some(old) = self.transcoder.lock().await.take() {
            debug!("closing the dead transcoder (pid {:?})", old.id());
            if let Err(e) = old.close().await {
                warn!("closing dead transcoder: {e}");
            }
        }

        debug!(
            "waiting {:?} before relaunching the transcoder",
            self.config.reconnect_backoff
        );
        tokio::time::sleep(self.config.reconnect_backoff).await;

        match Transcoder::launch(self.launcher.command(), &self.config.output_dir) {
            Ok(next) => {
                *self.transcoder.lock().await = Some(next);
                self.transition_to(SessionState::Idle);
                Ok(())
            }
            Err(e) => {
                // the attempt failed but the controller stays available;
                // the next frame's failure decides the next trigger
                self.transition_to(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Fire-and-forget reconnect; the outcome is observable only through
    /// the session state and health counters.
    fn spawn_reconnect(self: Arc<Self>) {
        tokio::spawn(async move {
            match self.reconnect().await {
                Ok(()) => info!("transcoder relaunched, resuming the stream"),
                Err(StreamError::AlreadyReconnecting) => {
                    debug!("reconnect already in progress, trigger dropped")
                }
                Err(StreamError::Aborted) => {
                    error!("reconnect budget exhausted, stream session aborted")
                }
                Err(e) => warn!("failed to reconnect: {e}"),
            }
        });
    }
}

/// Long-lived streaming session: the frame sink the producer loop feeds,
/// one frame per tick.
pub struct StreamerSession {
    shared: Arc<Shared>,
}

impl StreamerSession {
    /// Launch the transcoder and open the session.
    ///
    /// Fails fast: a session is never created around a transcoder that
    /// could not be launched.
    pub fn connect(config: StreamConfig) -> Result<Self, StreamError> {
        let launcher = FfmpegLauncher::new(config.clone());
        Self::with_launcher(config, Box::new(launcher))
    }

    /// Open a session around a custom transcoder invocation.
    pub fn with_launcher(
        config: StreamConfig,
        launcher: Box<dyn TranscoderLauncher>,
    ) -> Result<Self, StreamError> {
        std::fs::create_dir_all(&config.output_dir).map_err(StreamError::Launch)?;

        let transcoder = Transcoder::launch(launcher.command(), &config.output_dir)?;
        info!(
            "transcoder up (pid {:?}), streaming {}x{} RGBA at {} fps to {}",
            transcoder.id(),
            config.width,
            config.height,
            config.frame_rate,
            config.stream_url
        );

        Ok(Self {
            shared: Arc::new(Shared {
                launcher,
                transcoder: Mutex::new(Some(transcoder)),
                reconnect: Mutex::new(Cooldown {
                    deadline: Instant::now(),
                }),
                state: std::sync::Mutex::new(SessionState::Idle),
                health: Arc::new(StreamHealth::new()),
                config,
            }),
        })
    }

    /// Current lifecycle state, for the operator-facing layer.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Shared health counters, for the operator-facing layer.
    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.shared.health)
    }
}

#[async_trait]
impl FrameStreamer for StreamerSession {
    async fn stream(&self, frame: &RgbaImage) -> Result<(), StreamError> {
        match self.shared.state() {
            SessionState::Aborted => return Err(StreamError::Aborted),
            // frames are dropped, not buffered, while reconnecting
            SessionState::Reconnecting { .. } => {
                self.shared.health.record_frame_drop();
                return Ok(());
            }
            SessionState::Idle => {}
        }

        let (got_width, got_height) = frame.dimensions();
        if (got_width, got_height) != (self.shared.config.width, self.shared.config.height) {
            return Err(StreamError::Format {
                want_width: self.shared.config.width,
                want_height: self.shared.config.height,
                got_width,
                got_height,
            });
        }

        let pixels = frame.as_raw().as_slice();
        debug_assert_eq!(pixels.len(), self.shared.config.frame_len());

        let mut guard = self.shared.transcoder.lock().await;
        match guard.as_mut() {
            // the previous attempt failed to relaunch; this frame is the
            // next failure trigger
            None => {
                drop(guard);
                self.shared.health.record_pipe_error();
                Arc::clone(&self.shared).spawn_reconnect();
                Ok(())
            }
            Some(transcoder) => match transcoder.write_frame(pixels).await {
                Ok(()) => {
                    self.shared.health.record_frame(pixels.len());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    drop(guard);
                    warn!("broken pipe on transcoder stdin, reconnecting in the background");
                    self.shared.health.record_pipe_error();
                    Arc::clone(&self.shared).spawn_reconnect();
                    Ok(())
                }
                Err(e) => {
                    self.shared.health.record_write_error();
                    Err(StreamError::Write(e))
                }
            },
        }
    }

    async fn close(&self) -> Result<(), StreamError> {
        // waiting on the reconnect mutex lets an in-flight attempt finish,
        // so each process generation has exactly one owner tearing it down
        let _cooldown = self.shared.reconnect.lock().await;

        if !self.shared.state().is_aborted() {
            self.shared.transition_to(SessionState::Aborted);
        }

        info!("closing the frame streamer");
        if let Some(transcoder) = self.shared.transcoder.lock().await.take() {
            transcoder.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::process::Command;

    /// Stub transcoder: copies stdin into a unique file per generation.
    struct StubLauncher {
        dir: PathBuf,
    }

    impl TranscoderLauncher for StubLauncher {
        fn command(&self) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(format!("exec cat > {}/sink.$$", self.dir.display()));
            cmd
        }
    }

    /// Stub transcoder that dies after consuming exactly one frame, like a
    /// downstream connection dropping mid-stream.
    struct OneFrameLauncher {
        dir: PathBuf,
        frame_len: usize,
    }

    impl TranscoderLauncher for OneFrameLauncher {
        fn command(&self) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(format!(
                "exec head -c {} > {}/sink.$$",
                self.frame_len,
                self.dir.display()
            ));
            cmd
        }
    }

    const WIDTH: u32 = 4;
    const HEIGHT: u32 = 2;
    const FRAME_LEN: usize = (WIDTH * HEIGHT * 4) as usize;

    fn test_config(dir: &Path) -> StreamConfig {
        let mut config = StreamConfig::new(
            "rtmp://localhost/live/test".into(),
            dir.to_path_buf(),
            WIDTH,
            HEIGHT,
        );
        config.reconnect_backoff = Duration::from_millis(10);
        config.reconnect_penalty = Duration::from_secs(2);
        config.reconnect_ceiling = Duration::from_secs(3);
        config
    }

    fn stub_session(dir: &TempDir) -> StreamerSession {
        StreamerSession::with_launcher(
            test_config(dir.path()),
            Box::new(StubLauncher {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap()
    }

    fn frame() -> RgbaImage {
        RgbaImage::from_pixel(WIDTH, HEIGHT, image::Rgba([1, 2, 3, 255]))
    }

    fn sink_files(dir: &TempDir) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("sink."))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    fn sink_bytes(dir: &TempDir) -> Vec<u8> {
        sink_files(dir)
            .iter()
            .flat_map(|p| std::fs::read(p).unwrap())
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[test]
    fn cooldown_accumulates_then_decays() {
        let base = Instant::now();
        let penalty = Duration::from_secs(60);

        let mut cooldown = Cooldown { deadline: base };
        for _ in 0..3 {
            cooldown.deadline = cooldown.floor(base) + penalty;
        }
        assert_eq!(cooldown.deadline, base + 3 * penalty);

        // once the deadline lies in the past the budget snaps back to "now"
        let cooldown = Cooldown { deadline: base };
        std::thread::sleep(Duration::from_millis(20));
        let now = Instant::now();
        assert_eq!(cooldown.floor(now), now);
    }

    #[tokio::test]
    async fn streams_frames_in_producer_order() {
        let dir = TempDir::new().unwrap();
        let session = stub_session(&dir);

        for _ in 0..10 {
            session.stream(&frame()).await.unwrap();
        }
        session.close().await.unwrap();

        let written = sink_bytes(&dir);
        assert_eq!(written.len(), 10 * FRAME_LEN);
        assert_eq!(&written[..4], &[1, 2, 3, 255]);
        assert_eq!(session.health().frames_streamed(), 10);
        assert!(session.state().is_aborted());
    }

    #[tokio::test]
    async fn rejects_mismatched_frames_without_writing() {
        let dir = TempDir::new().unwrap();
        let session = stub_session(&dir);

        let wrong = RgbaImage::new(8, 8);
        match session.stream(&wrong).await {
            Err(StreamError::Format {
                want_width,
                got_width,
                ..
            }) => {
                assert_eq!(want_width, WIDTH);
                assert_eq!(got_width, 8);
            }
            other => panic!("expected a format error, got {other:?}"),
        }

        session.close().await.unwrap();
        assert!(sink_bytes(&dir).is_empty());
    }

    #[tokio::test]
    async fn broken_pipe_triggers_transparent_reconnect() {
        let dir = TempDir::new().unwrap();
        let session = StreamerSession::with_launcher(
            test_config(dir.path()),
            Box::new(OneFrameLauncher {
                dir: dir.path().to_path_buf(),
                frame_len: FRAME_LEN,
            }),
        )
        .unwrap();

        session.stream(&frame()).await.unwrap();

        // the stub consumed its one frame and exited
        tokio::time::sleep(Duration::from_millis(100)).await;

        // the failing write still returns Ok: the producer never stalls
        session.stream(&frame()).await.unwrap();
        assert_eq!(session.health().pipe_errors(), 1);

        let health = session.health();
        wait_until(|| session.state().is_idle() && health.reconnects() == 1).await;

        session.stream(&frame()).await.unwrap();
        session.close().await.unwrap();

        // one sink file per generation, the second one fed after recovery
        let files = sink_files(&dir);
        assert_eq!(files.len(), 2);
        assert_eq!(sink_bytes(&dir).len(), 2 * FRAME_LEN);
    }

    #[tokio::test]
    async fn single_flight_rejects_concurrent_triggers() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.reconnect_backoff = Duration::from_millis(300);
        let session = StreamerSession::with_launcher(
            config,
            Box::new(StubLauncher {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap();

        let shared = Arc::clone(&session.shared);
        let first = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move { shared.reconnect().await }
        });

        // let the first attempt take the lock and enter its backoff sleep
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.state().is_reconnecting());

        for _ in 0..4 {
            match shared.reconnect().await {
                Err(StreamError::AlreadyReconnecting) => {}
                other => panic!("expected AlreadyReconnecting, got {other:?}"),
            }
        }

        first.await.unwrap().unwrap();
        assert!(session.state().is_idle());
        assert_eq!(session.health().reconnects(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn drops_frames_without_blocking_during_reconnect() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.reconnect_backoff = Duration::from_millis(400);
        let session = StreamerSession::with_launcher(
            config,
            Box::new(StubLauncher {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap();

        let shared = Arc::clone(&session.shared);
        let attempt = tokio::spawn(async move { shared.reconnect().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.state().is_reconnecting());

        let started = Instant::now();
        session.stream(&frame()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(session.health().frames_dropped(), 1);

        attempt.await.unwrap().unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn cooldown_ceiling_aborts_and_stays_aborted() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.reconnect_backoff = Duration::from_millis(1);
        // two extensions fit under the ceiling, the third does not
        config.reconnect_penalty = Duration::from_secs(2);
        config.reconnect_ceiling = Duration::from_secs(5);
        let session = StreamerSession::with_launcher(
            config,
            Box::new(StubLauncher {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap();

        let shared = Arc::clone(&session.shared);
        shared.reconnect().await.unwrap();
        shared.reconnect().await.unwrap();
        match shared.reconnect().await {
            Err(StreamError::Aborted) => {}
            other => panic!("expected the abort signal, got {other:?}"),
        }
        assert!(session.state().is_aborted());

        // sticky: every subsequent call fails terminally, with no
        // further reconnect attempts
        for _ in 0..20 {
            match session.stream(&frame()).await {
                Err(StreamError::Aborted) => {}
                other => panic!("expected the abort signal, got {other:?}"),
            }
        }
        match shared.reconnect().await {
            Err(StreamError::Aborted) => {}
            other => panic!("expected the abort signal, got {other:?}"),
        }
        assert_eq!(session.health().reconnects(), 2);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_waits_for_an_inflight_reconnect() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.reconnect_backoff = Duration::from_millis(200);
        let session = StreamerSession::with_launcher(
            config,
            Box::new(StubLauncher {
                dir: dir.path().to_path_buf(),
            }),
        )
        .unwrap();

        let shared = Arc::clone(&session.shared);
        let attempt = tokio::spawn(async move { shared.reconnect().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.state().is_reconnecting());

        // close waits the attempt out, then tears down whatever
        // generation it left behind
        session.close().await.unwrap();
        assert!(session.state().is_aborted());
        attempt.await.unwrap().unwrap();
        assert!(session.shared.transcoder.lock().await.is_none());

        match session.stream(&frame()).await {
            Err(StreamError::Aborted) => {}
            other => panic!("expected the abort signal, got {other:?}"),
        }
    }
}
