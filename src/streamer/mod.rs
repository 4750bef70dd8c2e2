//! Resilient frame streaming over a subprocess transcoder
//!
//! The producer loop hands one bitmap per tick to a [`FrameStreamer`];
//! the [`StreamerSession`] implementation feeds it as raw RGBA into a
//! transcoder subprocess and keeps that pipe alive across downstream
//! failures without ever stalling the producer.

pub mod error;
pub mod session;
pub mod transcoder;

pub use error::StreamError;
pub use session::StreamerSession;
pub use transcoder::{FfmpegLauncher, Transcoder, TranscoderLauncher};

use async_trait::async_trait;
use image::RgbaImage;

/// Interface for streaming frames to different outputs.
#[async_trait]
pub trait FrameStreamer: Send + Sync {
    /// Deliver one frame.
    ///
    /// Returns quickly regardless of sink health: connection loss is
    /// handled in the background and only surfaces here once the session
    /// has aborted for good.
    async fn stream(&self, frame: &RgbaImage) -> Result<(), StreamError>;

    /// Shut the stream down, waiting for the transcoder to exit.
    async fn close(&self) -> Result<(), StreamError>;
}
