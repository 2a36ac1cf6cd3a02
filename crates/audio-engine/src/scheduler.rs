//! Live scheduling of decoded audio onto a real-time audio graph.
//!
//! The scheduler does not produce samples. For every audio clip playing at
//! the current timeline position it creates a gain node and starts one voice
//! per decoded chunk that falls inside the clip's trimmed range, timed
//! against the graph's clock. It also keeps the anchor needed to tell how
//! far the audio clock has drifted from the timeline.

use std::collections::HashMap;

use reelcut_common::clock::{DriftMeasurement, PlaybackClock};
use reelcut_common::config::PlaybackSettings;
use reelcut_media_model::{Clip, DecodedAudioChunk, DecodedAudioSource, Track, TrackKind};

/// Handle of a gain node in the audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GainId(pub u64);

/// Handle of a playing voice in the audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// When and how much of a chunk a voice plays. All values in graph seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledVoice {
    /// Gain node the voice feeds into.
    pub gain: GainId,

    /// Graph time at which playback starts.
    pub when_secs: f64,

    /// Position inside the chunk where playback starts.
    pub offset_secs: f64,

    /// How long the voice plays.
    pub duration_secs: f64,
}

/// The real-time audio output the scheduler drives.
pub trait AudioGraph {
    /// Current time of the graph's clock in seconds.
    fn current_time_secs(&self) -> f64;

    /// Create a gain node connected to the master output.
    fn create_gain(&mut self, volume: f32) -> GainId;

    /// Change the volume of an existing gain node.
    fn set_gain(&mut self, gain: GainId, volume: f32);

    /// Change the master output volume.
    fn set_master_gain(&mut self, volume: f32);

    /// Start playing `chunk` as described by `voice`.
    fn start_voice(&mut self, chunk: &DecodedAudioChunk, voice: ScheduledVoice) -> VoiceId;

    /// Stop a voice. Stopping a voice that already ended is a no-op.
    fn stop_voice(&mut self, voice: VoiceId);

    /// Disconnect a gain node from the master output.
    fn disconnect_gain(&mut self, gain: GainId);
}

#[derive(Debug)]
struct ActiveClip {
    clip_id: String,
    gain: GainId,
    voices: Vec<VoiceId>,
}

/// Timeline position and graph time captured when scheduling started.
#[derive(Debug, Clone, Copy)]
struct DriftAnchor {
    timeline_us: i64,
    clock_secs: f64,
}

/// Schedules audio clips on an [`AudioGraph`].
pub struct AudioScheduler<G: AudioGraph> {
    graph: G,
    drift_threshold_ms: f64,
    active: Vec<ActiveClip>,
    anchor: Option<DriftAnchor>,
}

impl<G: AudioGraph> AudioScheduler<G> {
    pub fn new(graph: G, settings: &PlaybackSettings) -> Self {
        Self {
            graph,
            drift_threshold_ms: settings.drift_threshold_ms,
            active: Vec::new(),
            anchor: None,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Schedule every audio clip playing at `current_time_us`.
    ///
    /// Anything scheduled before is stopped first. Returns the number of
    /// voices started.
    pub fn schedule_from(
        &mut self,
        tracks: &[Track],
        sources: &HashMap<String, DecodedAudioSource>,
        current_time_us: i64,
    ) -> usize {
        self.stop_all();

        let now = self.graph.current_time_secs();
        let mut started = 0;

        for track in tracks.iter().filter(|t| t.kind == TrackKind::Audio) {
            for clip in track.active_clips(current_time_us) {
                let Some(source) = sources.get(&clip.source_id) else {
                    tracing::debug!(clip = %clip.id, "Skipping clip without decoded audio");
                    continue;
                };
                let gain = self.graph.create_gain(clip.volume);
                let voices = self.schedule_clip(clip, source, gain, current_time_us, now);
                started += voices.len();
                self.active.push(ActiveClip {
                    clip_id: clip.id.clone(),
                    gain,
                    voices,
                });
            }
        }

        self.anchor = Some(DriftAnchor {
            timeline_us: current_time_us,
            clock_secs: now,
        });

        tracing::debug!(
            timeline_us = current_time_us,
            clips = self.active.len(),
            voices = started,
            "Audio scheduled"
        );
        started
    }

    fn schedule_clip(
        &mut self,
        clip: &Clip,
        source: &DecodedAudioSource,
        gain: GainId,
        current_time_us: i64,
        now_secs: f64,
    ) -> Vec<VoiceId> {
        let cursor_us = clip.timeline_to_source_us(current_time_us);
        let mut voices = Vec::new();

        for chunk in &source.chunks {
            let chunk_start = chunk.timestamp_us;
            let chunk_end = chunk.end_us();
            if chunk_end <= cursor_us || chunk_start >= clip.trim_out_us {
                continue;
            }

            let play_from = cursor_us.max(chunk_start);
            let play_to = chunk_end.min(clip.trim_out_us);
            if play_to <= play_from {
                continue;
            }

            let voice = ScheduledVoice {
                gain,
                when_secs: now_secs + PlaybackClock::us_to_secs(play_from - cursor_us),
                offset_secs: PlaybackClock::us_to_secs(play_from - chunk_start),
                duration_secs: PlaybackClock::us_to_secs(play_to - play_from),
            };
            voices.push(self.graph.start_voice(chunk, voice));
        }
        voices
    }

    /// Compare where the audio clock says playback is with the timeline.
    ///
    /// `None` until something has been scheduled.
    pub fn check_drift(&self, timeline_now_us: i64) -> Option<DriftMeasurement> {
        let anchor = self.anchor?;
        let elapsed = self.graph.current_time_secs() - anchor.clock_secs;
        Some(DriftMeasurement {
            reference_us: timeline_now_us,
            measured_us: anchor.timeline_us + PlaybackClock::secs_to_us(elapsed),
        })
    }

    /// Whether drift exceeds the configured threshold.
    pub fn is_drifting(&self, timeline_now_us: i64) -> bool {
        let Some(drift) = self.check_drift(timeline_now_us) else {
            return false;
        };
        let drifting = drift.exceeds_threshold_ms(self.drift_threshold_ms);
        if drifting {
            tracing::warn!(
                drift_ms = drift.drift_ms(),
                threshold_ms = self.drift_threshold_ms,
                "Audio drift detected"
            );
        }
        drifting
    }

    /// Change the volume of a scheduled clip. Returns `false` if the clip is
    /// not currently scheduled.
    pub fn set_clip_volume(&mut self, clip_id: &str, volume: f32) -> bool {
        match self.active.iter().find(|c| c.clip_id == clip_id) {
            Some(active) => {
                self.graph.set_gain(active.gain, volume);
                true
            }
            None => false,
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.graph.set_master_gain(volume);
    }

    /// Stop and disconnect everything, and forget the drift anchor.
    pub fn stop_all(&mut self) {
        for active in self.active.drain(..) {
            for voice in active.voices {
                self.graph.stop_voice(voice);
            }
            self.graph.disconnect_gain(active.gain);
        }
        self.anchor = None;
    }

    pub fn is_playing(&self) -> bool {
        self.anchor.is_some()
    }

    /// Number of voices currently scheduled.
    pub fn voice_count(&self) -> usize {
        self.active.iter().map(|c| c.voices.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingGraph {
        now: f64,
        next_id: u64,
        gains: HashMap<GainId, f32>,
        master: f32,
        started: Vec<(VoiceId, i64, ScheduledVoice)>,
        stopped: Vec<VoiceId>,
        disconnected: Vec<GainId>,
    }

    impl AudioGraph for RecordingGraph {
        fn current_time_secs(&self) -> f64 {
            self.now
        }

        fn create_gain(&mut self, volume: f32) -> GainId {
            self.next_id += 1;
            let id = GainId(self.next_id);
            self.gains.insert(id, volume);
            id
        }

        fn set_gain(&mut self, gain: GainId, volume: f32) {
            self.gains.insert(gain, volume);
        }

        fn set_master_gain(&mut self, volume: f32) {
            self.master = volume;
        }

        fn start_voice(&mut self, chunk: &DecodedAudioChunk, voice: ScheduledVoice) -> VoiceId {
            self.next_id += 1;
            let id = VoiceId(self.next_id);
            self.started.push((id, chunk.timestamp_us, voice));
            id
        }

        fn stop_voice(&mut self, voice: VoiceId) {
            self.stopped.push(voice);
        }

        fn disconnect_gain(&mut self, gain: GainId) {
            self.disconnected.push(gain);
        }
    }

    /// Ten 1-second mono chunks at 1 kHz.
    fn source() -> DecodedAudioSource {
        let chunks = (0..10)
            .map(|i| DecodedAudioChunk::interleaved(i * 1_000_000, vec![0.1; 1_000], 1_000, 1))
            .collect();
        DecodedAudioSource::new(1_000, 1, chunks)
    }

    fn setup(clip: Clip) -> (AudioScheduler<RecordingGraph>, Vec<Track>, HashMap<String, DecodedAudioSource>) {
        let graph = RecordingGraph {
            now: 10.0,
            ..Default::default()
        };
        let scheduler = AudioScheduler::new(graph, &PlaybackSettings::default());
        let tracks = vec![Track::new("a", TrackKind::Audio).with_clip(clip)];
        let sources = HashMap::from([("s".to_string(), source())]);
        (scheduler, tracks, sources)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_schedules_chunks_inside_trim() {
        // Clip plays source [2s, 5s) from timeline 1s.
        let (mut scheduler, tracks, sources) =
            setup(Clip::new("c", "s", 1_000_000, 2_000_000, 5_000_000).with_volume(0.5));

        // Timeline 1.5s is source 2.5s.
        let started = scheduler.schedule_from(&tracks, &sources, 1_500_000);
        assert_eq!(started, 3);

        let voices = &scheduler.graph().started;
        let (_, first_chunk, first) = &voices[0];
        assert_eq!(*first_chunk, 2_000_000);
        assert!(approx(first.when_secs, 10.0));
        assert!(approx(first.offset_secs, 0.5));
        assert!(approx(first.duration_secs, 0.5));

        let (_, _, second) = &voices[1];
        assert!(approx(second.when_secs, 10.5));
        assert!(approx(second.offset_secs, 0.0));
        assert!(approx(second.duration_secs, 1.0));

        let (_, last_chunk, last) = &voices[2];
        assert_eq!(*last_chunk, 4_000_000);
        assert!(approx(last.duration_secs, 1.0));

        assert_eq!(scheduler.graph().gains.values().copied().collect::<Vec<_>>(), vec![0.5]);
    }

    #[test]
    fn test_duration_never_crosses_trim_out() {
        let (mut scheduler, tracks, sources) =
            setup(Clip::new("c", "s", 0, 0, 1_500_000));
        scheduler.schedule_from(&tracks, &sources, 0);

        let voices = &scheduler.graph().started;
        assert_eq!(voices.len(), 2);
        assert!(approx(voices[1].2.duration_secs, 0.5));
    }

    #[test]
    fn test_inactive_clips_and_missing_sources_are_skipped() {
        let (mut scheduler, mut tracks, sources) = setup(Clip::new("c", "s", 5_000_000, 0, 1_000_000));
        assert_eq!(scheduler.schedule_from(&tracks, &sources, 0), 0);

        tracks[0].clips.push(Clip::new("m", "missing", 0, 0, 1_000_000));
        assert_eq!(scheduler.schedule_from(&tracks, &sources, 0), 0);
        assert!(scheduler.graph().gains.is_empty());
    }

    #[test]
    fn test_drift_tracks_graph_clock() {
        let (mut scheduler, tracks, sources) = setup(Clip::new("c", "s", 0, 0, 10_000_000));
        assert!(scheduler.check_drift(0).is_none());
        assert!(!scheduler.is_drifting(0));

        scheduler.schedule_from(&tracks, &sources, 1_000_000);
        scheduler.graph_mut().now = 11.0;

        let on_time = scheduler.check_drift(2_000_000).unwrap();
        assert_eq!(on_time.drift_us(), 0);
        assert!(!scheduler.is_drifting(2_010_000));
        assert!(scheduler.is_drifting(2_100_000));
    }

    #[test]
    fn test_volume_controls() {
        let (mut scheduler, tracks, sources) = setup(Clip::new("c", "s", 0, 0, 1_000_000));
        scheduler.schedule_from(&tracks, &sources, 0);

        assert!(scheduler.set_clip_volume("c", 0.25));
        assert!(!scheduler.set_clip_volume("nope", 0.25));
        assert_eq!(scheduler.graph().gains.values().copied().collect::<Vec<_>>(), vec![0.25]);

        scheduler.set_master_volume(0.75);
        assert_eq!(scheduler.graph().master, 0.75);
    }

    #[test]
    fn test_stop_all_stops_and_disconnects() {
        let (mut scheduler, tracks, sources) = setup(Clip::new("c", "s", 0, 0, 3_000_000));
        scheduler.schedule_from(&tracks, &sources, 0);
        assert_eq!(scheduler.voice_count(), 3);
        assert!(scheduler.is_playing());

        scheduler.stop_all();
        assert_eq!(scheduler.graph().stopped.len(), 3);
        assert_eq!(scheduler.graph().disconnected.len(), 1);
        assert_eq!(scheduler.voice_count(), 0);
        assert!(scheduler.check_drift(0).is_none());
    }

    #[test]
    fn test_rescheduling_replaces_previous_voices() {
        let (mut scheduler, tracks, sources) = setup(Clip::new("c", "s", 0, 0, 3_000_000));
        scheduler.schedule_from(&tracks, &sources, 0);
        scheduler.schedule_from(&tracks, &sources, 2_000_000);
        assert_eq!(scheduler.graph().stopped.len(), 3);
        assert_eq!(scheduler.voice_count(), 1);
    }
}
