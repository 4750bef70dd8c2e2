use crate::assets;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the streaming session needs, fixed at construction.
///
/// There is no hot-reload: changing any of these means tearing the session
/// down and building a new one.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Destination ingest endpoint (e.g. an RTMP URL with a stream key).
    pub stream_url: String,
    /// Working directory for transcoder diagnostic logs and captures.
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Transcoder binary, resolved through PATH.
    pub ffmpeg_path: String,
    pub video_bitrate_kbps: u32,
    pub keyframe_interval: u32,
    /// Pause between closing a dead transcoder and launching the next one.
    pub reconnect_backoff: Duration,
    /// Penalty added to the cooldown deadline on every reconnect entry.
    pub reconnect_penalty: Duration,
    /// Once the accumulated deadline is further than this beyond "now",
    /// the session aborts instead of reconnecting.
    pub reconnect_ceiling: Duration,
}

impl StreamConfig {
    pub fn new(stream_url: String, output_dir: PathBuf, width: u32, height: u32) -> Self {
        Self {
            stream_url,
            output_dir,
            width,
            height,
            frame_rate: assets::FRAME_RATE,
            ffmpeg_path: String::from("ffmpeg"),
            video_bitrate_kbps: assets::VIDEO_BITRATE_KBPS,
            keyframe_interval: assets::KEYFRAME_INTERVAL,
            reconnect_backoff: Duration::from_secs(assets::RECONNECT_BACKOFF_SECS),
            reconnect_penalty: Duration::from_secs(assets::RECONNECT_PENALTY_SECS),
            reconnect_ceiling: Duration::from_secs(assets::RECONNECT_CEILING_SECS),
        }
    }

    /// Exact byte length of one raw RGBA frame on the wire.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

pub struct Config {
    pub stream: StreamConfig,
    pub control_port: u16,
    /// API key for the live chat poller; chat ingestion stays parked
    /// without one.
    pub youtube_api_key: Option<String>,
}

impl Config {
    /// Assemble the configuration from the environment around an
    /// explicitly supplied ingest endpoint.
    ///
    /// `YOUTUBE_LIVE_API` and `PORT` are optional; CLI flags may override
    /// individual fields afterwards.
    pub fn from_env(stream_url: String) -> anyhow::Result<Self> {
        let control_port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim_start_matches(':')
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("PORT is not a valid port number: {raw}"))?,
            Err(_) => assets::CONTROL_PORT,
        };

        Ok(Config {
            stream: StreamConfig::new(
                stream_url,
                PathBuf::from(assets::DEFAULT_OUTPUT_DIR),
                assets::FRAME_WIDTH,
                assets::FRAME_HEIGHT,
            ),
            control_port,
            youtube_api_key: std::env::var("YOUTUBE_LIVE_API").ok(),
        })
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
