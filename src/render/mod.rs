//! Frame content generation

pub mod scene;

pub use scene::Scene;
