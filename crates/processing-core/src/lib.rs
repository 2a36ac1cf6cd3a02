//! Reelcut Processing Core
//!
//! Random access into demuxed media and decoded frame bookkeeping:
//! - **Sample Index:** Binary search over sample tables and keyframe indices
//! - **Frame Buffer:** Bounded, time-ordered cache of decoded video frames
//!
//! This crate is pure computation with no I/O and no codec dependencies.
//! All inputs are data; all outputs are data.

pub mod frame_buffer;
pub mod sample_index;

pub use frame_buffer::FrameBuffer;
pub use sample_index::{find_keyframe_before, find_sample_at_time};
