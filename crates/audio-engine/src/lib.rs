//! Reelcut Audio Engine
//!
//! Two consumers of the same clip/track model:
//! - **Mixer:** Sample-accurate offline mixdown of audio tracks for export
//! - **Scheduler:** Live playback of decoded chunks on a real-time audio graph
//!
//! Neither engine decodes anything. Both read pre-decoded PCM.

pub mod mixer;
pub mod scheduler;

pub use mixer::{mix_audio_tracks, MixConfig};
pub use scheduler::{AudioGraph, AudioScheduler, GainId, ScheduledVoice, VoiceId};
