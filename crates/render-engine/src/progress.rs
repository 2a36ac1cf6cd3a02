//! Export progress accounting.

use reelcut_common::clock::PlaybackClock;
use reelcut_media_model::{ExportProgress, ExportStage};

/// Share of overall progress attributed to video when there is audio.
pub const VIDEO_WEIGHT: f64 = 0.7;

/// Share of overall progress attributed to audio.
pub const AUDIO_WEIGHT: f64 = 0.3;

/// No ETA is reported until overall progress passes this percentage.
pub const ETA_MIN_PROGRESS_PCT: f64 = 1.0;

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Build a progress report from raw counters.
pub fn progress_report(
    stage: ExportStage,
    video: (usize, usize),
    audio: Option<(usize, usize)>,
    elapsed_ms: u64,
) -> ExportProgress {
    let video_pct = percent(video.0, video.1);
    let audio_pct = audio.map(|(done, total)| percent(done, total)).unwrap_or(100.0);
    let overall = match audio {
        Some(_) => video_pct * VIDEO_WEIGHT + audio_pct * AUDIO_WEIGHT,
        None => video_pct,
    };

    let estimated_remaining_ms = (overall > ETA_MIN_PROGRESS_PCT).then(|| {
        let total_ms = elapsed_ms as f64 * 100.0 / overall;
        (total_ms - elapsed_ms as f64).max(0.0).round() as u64
    });

    ExportProgress {
        stage,
        video_progress_pct: video_pct,
        audio_progress_pct: audio_pct,
        overall_progress_pct: overall,
        estimated_remaining_ms,
    }
}

/// Counts encoded units and decides when a report is due.
#[derive(Debug)]
pub struct ProgressTracker {
    clock: PlaybackClock,
    interval: usize,
    video_total: usize,
    video_done: usize,
    audio_total: Option<usize>,
    audio_done: usize,
}

impl ProgressTracker {
    /// `audio_total` is `None` when the export has no audio.
    pub fn new(interval: usize, video_total: usize, audio_total: Option<usize>) -> Self {
        Self {
            clock: PlaybackClock::start(),
            interval: interval.max(1),
            video_total,
            video_done: 0,
            audio_total,
            audio_done: 0,
        }
    }

    /// Count one encoded video frame. Returns `true` when a report is due.
    pub fn video_encoded(&mut self) -> bool {
        self.video_done += 1;
        self.video_done % self.interval == 0
    }

    /// Count one encoded audio chunk. Returns `true` when a report is due.
    pub fn audio_encoded(&mut self) -> bool {
        self.audio_done += 1;
        self.audio_done % self.interval == 0
    }

    /// The number of video frames that will actually be encoded, once known.
    pub fn set_video_total(&mut self, total: usize) {
        self.video_total = total;
    }

    pub fn set_audio_total(&mut self, total: usize) {
        if self.audio_total.is_some() {
            self.audio_total = Some(total);
        }
    }

    pub fn video_done(&self) -> usize {
        self.video_done
    }

    pub fn report(&self, stage: ExportStage) -> ExportProgress {
        progress_report(
            stage,
            (self.video_done, self.video_total),
            self.audio_total.map(|total| (self.audio_done, total)),
            self.clock.elapsed_ms(),
        )
    }
}
