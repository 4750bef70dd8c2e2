//! Transcoder subprocess handle
//!
//! Wraps one live transcoder process generation: its child handle and the
//! writable stdin pipe carrying the raw RGBA stream. A generation is never
//! reused; reconnection replaces the whole handle.

use crate::config::StreamConfig;
use crate::streamer::error::StreamError;
use log::{debug, warn};
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// Builds the transcoder invocation.
///
/// The session calls this once per process generation, so the same recipe
/// serves the initial launch and every reconnect. Tests substitute a stub
/// process here.
pub trait TranscoderLauncher: Send + Sync {
    fn command(&self) -> Command;
}

/// Production launcher: ffmpeg consuming raw RGBA on stdin and pushing an
/// FLV stream to the configured ingest endpoint.
pub struct FfmpegLauncher {
    config: StreamConfig,
}

impl FfmpegLauncher {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    fn args(&self) -> Vec<String> {
        let c = &self.config;
        let video_size = format!("{}x{}", c.width, c.height);
        let frame_rate = c.frame_rate.to_string();
        let keyint = c.keyframe_interval.to_string();
        let bitrate = format!("{}k", c.video_bitrate_kbps);
        let bufsize = format!("{}k", c.video_bitrate_kbps / 2);
        let x264_params = format!(
            "scenecut=0:open_gop=0:min-keyint={}:keyint={}",
            c.keyframe_interval, c.keyframe_interval
        );
        [
            // input: raw, unframed RGBA at a fixed size and rate
            "-y",
            "-f", "rawvideo",
            "-pixel_format", "rgba",
            "-video_size", video_size.as_str(),
            "-r", frame_rate.as_str(),
            "-i", "-",
            // silent audio bed, most ingest endpoints reject video-only
            "-f", "lavfi",
            "-i", "anullsrc=r=44100:cl=stereo",
            "-g", keyint.as_str(),
            "-pix_fmt", "yuv420p",
            "-vcodec", "libx264",
            "-preset", "ultrafast",
            "-crf", "23",
            "-threads", "2",
            "-b:v", bitrate.as_str(),
            "-maxrate", bitrate.as_str(),
            "-bufsize", bufsize.as_str(),
            "-b:a", "128k",
            "-c:a", "mp3",
            "-async", "1",
            "-vsync", "vfr",
            "-ac", "2",
            "-ar", "44100",
            "-x264-params", x264_params.as_str(),
            "-x264opts", "cabac=1:ref=1:bframes=2",
            "-tune", "zerolatency",
            "-f", "flv",
            "-reconnect", "1",
            "-reconnect_at_eof", "1",
            "-reconnect_streamed", "1",
            "-reconnect_delay_max", "10",
            c.stream_url.as_str(),
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

impl TranscoderLauncher for FfmpegLauncher {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(self.args());
        cmd
    }
}

/// One live transcoder process generation.
///
/// Once closed, never reused; a new instance is required for each
/// generation, which consuming `close` makes unrepresentable otherwise.
pub struct Transcoder {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Transcoder {
    /// Spawn the transcoder with a piped stdin.
    ///
    /// The process keeps its own diagnostic log: stderr goes to a file in
    /// `output_dir` named by the launch time.
    pub fn launch(mut cmd: Command, output_dir: &Path) -> Result<Self, StreamError> {
        let log_path =
            output_dir.join(format!("transcoder.{}.log", chrono::Utc::now().timestamp()));
        let log_file = std::fs::File::create(&log_path).map_err(StreamError::Launch)?;

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log_file))
            .kill_on_drop(true)
            .spawn()
            .map_err(StreamError::Launch)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            StreamError::Launch(io::Error::new(
                io::ErrorKind::NotConnected,
                "transcoder stdin was not piped",
            ))
        })?;

        debug!(
            "transcoder launched (pid {:?}), stderr -> {}",
            child.id(),
            log_path.display()
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
        })
    }

    /// OS process id of this generation, while it is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write one frame-sized raw pixel buffer to the pipe.
    ///
    /// The caller guarantees `pixels` is exactly `width * height * 4`
    /// bytes; a short or oversized buffer would desynchronize the raw
    /// stream downstream.
    pub async fn write_frame(&mut self, pixels: &[u8]) -> io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transcoder stdin already closed",
            ));
        };
        stdin.write_all(pixels).await
    }

    /// Close the input pipe (end-of-stream), then wait for process exit.
    pub async fn close(mut self) -> Result<(), StreamError> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("closing transcoder stdin: {e}");
            }
        }
        let status = self.child.wait().await.map_err(StreamError::Close)?;
        if !status.success() {
            // a transcoder torn down mid-stream exits non-zero
            debug!("transcoder exited with {status}");
        }
        Ok(())
    }
}
