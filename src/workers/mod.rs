//! Long-running worker tasks

pub mod chat;
pub mod producer;

pub use chat::ChatPoller;
pub use producer::Producer;
