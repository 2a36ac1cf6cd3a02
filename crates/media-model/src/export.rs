//! Export request parameters and progress reporting.

use chrono::{DateTime, TimeZone};
use reelcut_common::config::ExportDefaults;
use reelcut_common::error::{ReelcutError, ReelcutResult};
use serde::{Deserialize, Serialize};

/// Parameters for one trimmed export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Start of the exported range (µs, inclusive).
    pub in_point_us: i64,

    /// End of the exported range (µs, exclusive).
    pub out_point_us: i64,

    /// Target video bitrate in bits per second.
    pub video_bitrate: u32,

    /// Target audio bitrate in bits per second.
    pub audio_bitrate: u32,

    /// Output audio sample rate.
    pub audio_sample_rate: u32,

    /// Name of the source, used to derive the output filename.
    pub source_name: String,

    /// Output video codec identifier.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Output audio codec identifier.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Output audio channel count. `None` keeps the source layout.
    #[serde(default)]
    pub audio_channels: Option<u16>,
}

fn default_video_codec() -> String {
    ExportDefaults::default().video_codec
}

fn default_audio_codec() -> String {
    ExportDefaults::default().audio_codec
}

impl ExportConfig {
    /// Build a config for `[in_point_us, out_point_us)` from the app defaults.
    pub fn from_defaults(
        defaults: &ExportDefaults,
        source_name: impl Into<String>,
        in_point_us: i64,
        out_point_us: i64,
    ) -> Self {
        Self {
            in_point_us,
            out_point_us,
            video_bitrate: defaults.video_bitrate,
            audio_bitrate: defaults.audio_bitrate,
            audio_sample_rate: defaults.audio_sample_rate,
            source_name: source_name.into(),
            video_codec: defaults.video_codec.clone(),
            audio_codec: defaults.audio_codec.clone(),
            audio_channels: Some(defaults.audio_channels),
        }
    }

    /// Length of the exported range in microseconds.
    pub fn duration_us(&self) -> i64 {
        self.out_point_us - self.in_point_us
    }

    /// Reject empty or negative ranges.
    pub fn validate(&self) -> ReelcutResult<()> {
        if self.in_point_us < 0 {
            return Err(ReelcutError::invalid_input(format!(
                "in point {}us must not be negative",
                self.in_point_us
            )));
        }
        if self.out_point_us <= self.in_point_us {
            return Err(ReelcutError::invalid_input(format!(
                "out point {}us must be after in point {}us",
                self.out_point_us, self.in_point_us
            )));
        }
        if self.audio_sample_rate == 0 {
            return Err(ReelcutError::invalid_input("audio sample rate must be non-zero"));
        }
        Ok(())
    }

    /// `{base}_trimmed_{YYYY-MM-DDTHH-MM-SS}.mp4`, where `base` is the source
    /// name without its extension.
    pub fn output_filename<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let base = std::path::Path::new(&self.source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("export");
        format!("{base}_trimmed_{}.mp4", at.format("%Y-%m-%dT%H-%M-%S"))
    }
}

/// Stages of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Idle,
    Demuxing,
    EncodingVideo,
    EncodingAudio,
    Finalizing,
    Complete,
    Aborted,
    Error,
}

impl ExportStage {
    /// Whether the run has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Error)
    }
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub stage: ExportStage,

    /// Video progress in percent [0, 100].
    pub video_progress_pct: f64,

    /// Audio progress in percent [0, 100]. 100 when there is no audio.
    pub audio_progress_pct: f64,

    /// Weighted overall progress in percent [0, 100].
    pub overall_progress_pct: f64,

    /// Estimated time remaining. Absent until enough work is done to tell.
    pub estimated_remaining_ms: Option<u64>,
}

impl ExportProgress {
    /// A report with no work done yet.
    pub fn at_stage(stage: ExportStage) -> Self {
        Self {
            stage,
            video_progress_pct: 0.0,
            audio_progress_pct: 0.0,
            overall_progress_pct: 0.0,
            estimated_remaining_ms: None,
        }
    }
}
