//! Frame production loop
//!
//! Drives the scene on a fixed-period tick and feeds every rendered frame
//! to the streaming sink. The tick cadence never depends on sink health:
//! a reconnecting sink swallows the frame and the loop moves on.

use crate::assets::MAX_STREAM_FAIL;
use crate::events::Command;
use crate::pipeline::FrameClock;
use crate::render::Scene;
use crate::streamer::{FrameStreamer, StreamError, StreamerSession};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct Producer {
    session: Arc<StreamerSession>,
    scene: Scene,
    clock: FrameClock,
    commands: mpsc::Receiver<Command>,
    /// Mirror of the scene title for the control surface.
    title: Arc<std::sync::Mutex<String>>,
    output_dir: PathBuf,
    frame_rate: u32,
    cancel: CancellationToken,
}

impl Producer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<StreamerSession>,
        scene: Scene,
        clock: FrameClock,
        commands: mpsc::Receiver<Command>,
        title: Arc<std::sync::Mutex<String>>,
        output_dir: PathBuf,
        frame_rate: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            scene,
            clock,
            commands,
            title,
            output_dir,
            frame_rate,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1) / self.frame_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Producer: started at {} fps", self.frame_rate);
        let mut error_streak: u32 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let paused = self.scene.paused;
            let frame = self.scene.render();

            if !paused {
                match self.session.stream(frame).await {
                    Ok(()) => error_streak = 0,
                    Err(StreamError::Aborted) => {
                        error!("Producer: stream session aborted, shutting down");
                        self.cancel.cancel();
                        break;
                    }
                    Err(e) => {
                        error_streak += 1;
                        warn!("Producer: {e} ({error_streak} consecutive errors)");
                        if error_streak > MAX_STREAM_FAIL {
                            error!("Producer: too many stream errors, shutting down");
                            self.cancel.cancel();
                            break;
                        }
                    }
                }
            }
            self.clock.record_frame(started.elapsed());

            while let Ok(command) = self.commands.try_recv() {
                self.handle(command);
            }
        }

        info!("Producer: stopped after {} frames", self.clock.frame_count());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Info => {
                info!(
                    "Producer: frame {} (avg frame time {:?}), title {:?}",
                    self.clock.frame_count(),
                    self.clock.average_frame_time(),
                    self.scene.title
                );
                info!("Producer: {}", self.session.health().summary());
            }
            Command::Capture => {
                let path = self.output_dir.join("capture.png");
                match self.scene.capture(&path) {
                    Ok(()) => info!("Producer: captured frame to {}", path.display()),
                    Err(e) => warn!("Producer: capture failed: {e}"),
                }
            }
            Command::SetText(text) => {
                *self.title.lock().unwrap() = text.clone();
                self.scene.title = text;
            }
            Command::TogglePause => {
                self.scene.paused = !self.scene.paused;
                info!(
                    "Producer: streaming {}",
                    if self.scene.paused { "paused" } else { "resumed" }
                );
            }
            Command::Bang => self.scene.bang(),
        }
    }
}
