//! Error types for the streaming sink

use thiserror::Error;

/// Error type for streaming operations
///
/// Transient conditions (`Format`, `Write`) are local and recoverable by
/// the caller. Connection loss is recovered internally and never appears
/// here; `Aborted` is the terminal signal once the reconnect budget is
/// exhausted.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Transcoder process or its input pipe could not be created
    #[error("failed to launch transcoder: {0}")]
    Launch(#[source] std::io::Error),

    /// Supplied bitmap does not match the session's frame geometry
    #[error("frame is {got_width}x{got_height}, expected {want_width}x{want_height} RGBA")]
    Format {
        want_width: u32,
        want_height: u32,
        got_width: u32,
        got_height: u32,
    },

    /// Pipe write failed for a reason other than a broken connection
    #[error("failed to write raw frame data: {0}")]
    Write(#[source] std::io::Error),

    /// Closing the transcoder failed
    #[error("failed to close transcoder: {0}")]
    Close(#[source] std::io::Error),

    /// Reconnect ceiling exceeded, or the session was closed; terminal
    #[error("stream session aborted")]
    Aborted,

    /// A reconnect attempt is already in flight; the trigger was dropped
    #[error("already reconnecting")]
    AlreadyReconnecting,
}
