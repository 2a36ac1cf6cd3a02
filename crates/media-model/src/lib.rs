//! Reelcut Media Model
//!
//! Defines the core data contracts shared by playback and export:
//! - **Samples:** Demuxed encoded units with rational timestamps and keyframe flags
//! - **Sources:** Per-source sample tables, keyframe indices, and the manifest ingestion format
//! - **Timeline:** Clips and tracks placed on the composition timeline
//! - **Decoded media:** Owned video frame handles and PCM audio chunks
//! - **Export:** Export configuration and progress reporting types
//!
//! All times exposed to callers are integer microseconds. Sample tables keep
//! their native `cts / timescale` representation and convert on demand.

pub mod audio;
pub mod export;
pub mod frame;
pub mod sample;
pub mod source;
pub mod timeline;

pub use audio::*;
pub use export::*;
pub use frame::*;
pub use sample::*;
pub use source::*;
pub use timeline::*;
