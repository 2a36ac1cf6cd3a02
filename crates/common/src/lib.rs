//! Reelcut Common Utilities
//!
//! Shared infrastructure for all Reelcut crates:
//! - Error taxonomy and result aliases
//! - Playback clock and audio/video drift measurement
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
