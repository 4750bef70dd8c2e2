/// Control events that mutate the running scene.
///
/// Producers are the HTTP control surface and the chat poller; the frame
/// producer loop is the only consumer and drains the queue once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log the current frame statistics.
    Info,
    /// Save the current frame as a PNG in the working directory.
    Capture,
    /// Replace the scene title.
    SetText(String),
    /// Pause or resume streaming without stopping frame generation.
    TogglePause,
    /// Trigger the bang flash effect.
    Bang,
}
