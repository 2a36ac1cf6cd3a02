//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Export pipeline defaults.
    pub export: ExportDefaults,

    /// Live playback tuning.
    pub playback: PlaybackSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters and pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Directory where exported files are written by the CLI.
    pub output_dir: PathBuf,

    /// Output video codec identifier.
    pub video_codec: String,

    /// Output audio codec identifier.
    pub audio_codec: String,

    /// Video bitrate in bits per second.
    pub video_bitrate: u32,

    /// Audio bitrate in bits per second.
    pub audio_bitrate: u32,

    /// Output audio sample rate.
    pub audio_sample_rate: u32,

    /// Output audio channel count.
    pub audio_channels: u16,

    /// Emit a progress report every N encoded frames.
    pub progress_interval_frames: usize,

    /// Check for cancellation every N samples submitted to a decoder.
    pub decode_batch_size: usize,

    /// Upper bound on decoded frames plus container bytes held in memory.
    pub memory_limit_bytes: u64,
}

/// Live playback buffer and sync parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Maximum decoded frames held by the frame buffer.
    pub frame_buffer_max_size: usize,

    /// Frames further than this behind the playhead are pruned (µs).
    pub frame_buffer_max_lag_us: i64,

    /// Audio/video divergence that counts as drift (ms).
    pub drift_threshold_ms: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            video_codec: "raw".to_string(),
            audio_codec: "pcm-f32".to_string(),
            video_bitrate: 5_000_000,
            audio_bitrate: 128_000,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            progress_interval_frames: 10,
            decode_batch_size: 30,
            memory_limit_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_buffer_max_size: 10,
            frame_buffer_max_lag_us: 500_000,
            drift_threshold_ms: 50.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcut").join("config.json")
}
