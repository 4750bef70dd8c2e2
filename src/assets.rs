pub const FRAME_RATE: u32 = 30;
pub const FRAME_WIDTH: u32 = 1280;
pub const FRAME_HEIGHT: u32 = 720;

// transcoder invocation
pub const VIDEO_BITRATE_KBPS: u32 = 3000;
pub const KEYFRAME_INTERVAL: u32 = 60;

// connections
pub const MAX_STREAM_FAIL: u32 = 5;
pub const RECONNECT_BACKOFF_SECS: u64 = 2;
pub const RECONNECT_PENALTY_SECS: u64 = 60;
pub const RECONNECT_CEILING_SECS: u64 = 300;

// control surface
pub const CONTROL_PORT: u16 = 8081;

// chat ingestion
pub const CHAT_POLL_FLOOR_SECS: u64 = 3;
pub const MAX_CHAT_FAIL: u32 = 10;

pub const DEFAULT_OUTPUT_DIR: &str = "./debug";
pub const DEFAULT_TITLE: &str = "Playcast Live Game Engine!";
