//! Composition timeline: clips placed on typed tracks.
//!
//! Clips and tracks are owned by the composition and mutated by editing
//! operations elsewhere; the playback and export engines only read them.

use serde::{Deserialize, Serialize};

/// A trimmed reference to a source, positioned on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,

    /// Source this clip plays from.
    pub source_id: String,

    /// Position of the clip's first played sample on the timeline (µs).
    pub timeline_start_us: i64,

    /// Source-relative start of the played range (µs).
    pub trim_in_us: i64,

    /// Source-relative end of the played range (µs, exclusive).
    pub trim_out_us: i64,

    /// Linear gain applied to the clip's audio.
    #[serde(default = "default_unit")]
    pub volume: f32,

    /// Opacity applied by the compositor (not used by the audio engines).
    #[serde(default = "default_unit")]
    pub opacity: f32,
}

fn default_unit() -> f32 {
    1.0
}

impl Clip {
    /// Create a clip at full volume and opacity.
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        timeline_start_us: i64,
        trim_in_us: i64,
        trim_out_us: i64,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            timeline_start_us,
            trim_in_us,
            trim_out_us,
            volume: 1.0,
            opacity: 1.0,
        }
    }

    /// Builder-style volume setter.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Played duration in microseconds.
    pub fn duration_us(&self) -> i64 {
        self.trim_out_us - self.trim_in_us
    }

    /// Timeline position where the clip stops playing (exclusive).
    pub fn timeline_end_us(&self) -> i64 {
        self.timeline_start_us + self.duration_us()
    }

    /// Whether the clip is playing at the given timeline time.
    pub fn is_active_at(&self, timeline_us: i64) -> bool {
        timeline_us >= self.timeline_start_us && timeline_us < self.timeline_end_us()
    }

    /// The part of `[start_us, end_us)` this clip covers, if any.
    pub fn overlap(&self, start_us: i64, end_us: i64) -> Option<(i64, i64)> {
        let from = self.timeline_start_us.max(start_us);
        let to = self.timeline_end_us().min(end_us);
        (from < to).then_some((from, to))
    }

    /// Map a timeline time inside the clip to source time.
    pub fn timeline_to_source_us(&self, timeline_us: i64) -> i64 {
        self.trim_in_us + (timeline_us - self.timeline_start_us)
    }

    /// Check `trim_in < trim_out <= source_duration`.
    pub fn validate(&self, source_duration_us: i64) -> Result<(), ClipError> {
        if self.trim_in_us < 0 || self.trim_in_us >= self.trim_out_us {
            return Err(ClipError::InvalidTrim {
                clip_id: self.id.clone(),
                trim_in_us: self.trim_in_us,
                trim_out_us: self.trim_out_us,
            });
        }
        if self.trim_out_us > source_duration_us {
            return Err(ClipError::TrimBeyondSource {
                clip_id: self.id.clone(),
                trim_out_us: self.trim_out_us,
                source_duration_us,
            });
        }
        Ok(())
    }
}

/// Track type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Overlay,
}

/// An ordered list of clips of one kind. Overlap is not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            clips: vec![],
        }
    }

    /// Builder-style clip append.
    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Clips playing at the given timeline time.
    pub fn active_clips(&self, timeline_us: i64) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.is_active_at(timeline_us))
    }
}

/// Clip validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("Clip {clip_id}: trim in {trim_in_us}us must be before trim out {trim_out_us}us")]
    InvalidTrim {
        clip_id: String,
        trim_in_us: i64,
        trim_out_us: i64,
    },

    #[error("Clip {clip_id}: trim out {trim_out_us}us exceeds source duration {source_duration_us}us")]
    TrimBeyondSource {
        clip_id: String,
        trim_out_us: i64,
        source_duration_us: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration_and_end() {
        let clip = Clip::new("c1", "s1", 2_000_000, 500_000, 1_500_000);
        assert_eq!(clip.duration_us(), 1_000_000);
        assert_eq!(clip.timeline_end_us(), 3_000_000);
        assert!(clip.is_active_at(2_000_000));
        assert!(!clip.is_active_at(3_000_000));
        assert_eq!(clip.timeline_to_source_us(2_250_000), 750_000);
    }

    #[test]
    fn test_clip_overlap() {
        let clip = Clip::new("c1", "s1", 1_000, 0, 1_000);
        assert_eq!(clip.overlap(0, 1_500), Some((1_000, 1_500)));
        assert_eq!(clip.overlap(2_000, 3_000), None);
        assert_eq!(clip.overlap(0, 1_000), None);
    }

    #[test]
    fn test_clip_validation() {
        assert!(Clip::new("ok", "s", 0, 0, 10).validate(10).is_ok());
        assert!(matches!(
            Clip::new("bad", "s", 0, 10, 10).validate(20),
            Err(ClipError::InvalidTrim { .. })
        ));
        assert!(matches!(
            Clip::new("long", "s", 0, 0, 30).validate(20),
            Err(ClipError::TrimBeyondSource { .. })
        ));
    }

    #[test]
    fn test_track_json_uses_lowercase_kind() {
        let track = Track::new("a1", TrackKind::Audio).with_clip(Clip::new("c", "s", 0, 0, 1));
        let json = serde_json::to_string(&track).unwrap();
        assert!(json.contains("\"kind\":\"audio\""));
        let parsed: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, track);
    }

    #[test]
    fn test_clip_defaults_volume_when_missing() {
        let raw = r#"{"id":"c","source_id":"s","timeline_start_us":0,"trim_in_us":0,"trim_out_us":5}"#;
        let clip: Clip = serde_json::from_str(raw).unwrap();
        assert_eq!(clip.volume, 1.0);
        assert_eq!(clip.opacity, 1.0);
    }
}
