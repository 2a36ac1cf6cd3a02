//! Reelcut Render Engine
//!
//! Trim-and-transcode export for a single source clip.
//!
//! # Pipeline Architecture
//!
//! ```text
//! bundle / manifest ──► Demuxer ──► sample range (keyframe pre-roll)
//!                                        │
//!                         ┌──────────────┴──────────────┐
//!                   VideoDecoder                   AudioDecoder
//!                         │                             │
//!                   VideoEncoder                   AudioEncoder
//!                         └──────────────┬──────────────┘
//!                                        ▼
//!                                   Mp4Muxer ──► output.mp4
//! ```
//!
//! Codecs and containers sit behind the [`backend::MediaBackend`] trait.
//! [`builtin::BuiltinBackend`] provides uncompressed codecs, the sample
//! bundle demuxer and the MP4 muxer. [`worker`] runs exports off the
//! caller's task and reports over channels.

pub mod backend;
pub mod builtin;
pub mod bundle;
pub mod mp4;
pub mod pipeline;
pub mod progress;
pub mod range;
pub mod raw;
pub mod worker;

pub use backend::{EncodedChunk, MediaBackend};
pub use builtin::BuiltinBackend;
pub use pipeline::{
    run_export, ExportArtifact, ExportEvent, ExportOutcome, ExportRequest, ExportSettings,
    SourceInput,
};
pub use worker::{spawn_export_worker, ExportCommand, ExportResponse, ExportWorkerHandle};
