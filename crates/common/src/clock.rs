//! Clock and timing utilities for audio/video synchronization.
//!
//! Live playback schedules audio against a monotonic clock anchored when
//! playback starts. This module provides utilities for:
//! - Capturing the epoch
//! - Converting between microsecond timeline time and clock seconds
//! - Calculating drift between the audio clock and the timeline

use std::time::Instant;

/// A monotonic clock that reports time relative to a fixed epoch
/// (the moment it was started).
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl PlaybackClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Milliseconds elapsed since the clock started.
    pub fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Wall-clock time at clock start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert microseconds to seconds.
    pub fn us_to_secs(us: i64) -> f64 {
        us as f64 / 1_000_000.0
    }

    /// Convert seconds to microseconds (rounded to nearest).
    pub fn secs_to_us(secs: f64) -> i64 {
        (secs * 1_000_000.0).round() as i64
    }
}

/// Drift measurement between two streams, both expressed in microseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftMeasurement {
    /// Where the reference stream (the timeline) says we should be.
    pub reference_us: i64,
    /// Where the measured stream (the audio clock) actually is.
    pub measured_us: i64,
}

impl DriftMeasurement {
    /// Drift in microseconds (positive = measured is ahead).
    pub fn drift_us(&self) -> i64 {
        self.measured_us - self.reference_us
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_us() as f64 / 1_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}
