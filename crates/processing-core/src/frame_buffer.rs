//! Bounded cache of decoded frames for live playback.
//!
//! The buffer owns every frame it holds. Frames leave the buffer in one of
//! four ways (eviction on push, lag pruning after a lookup, `clear`, or the
//! buffer being dropped) and each of them releases the frame. Callers only
//! ever receive independent copies.

use std::collections::VecDeque;

use reelcut_common::config::PlaybackSettings;
use reelcut_media_model::DecodedVideoFrame;

/// Time-ordered decoded frame cache.
#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<(i64, DecodedVideoFrame)>,
    max_size: usize,
    max_lag_us: i64,
}

impl FrameBuffer {
    /// Create a buffer holding at most `max_size` frames.
    ///
    /// A `max_size` of zero is treated as one.
    pub fn new(max_size: usize, max_lag_us: i64) -> Self {
        let max_size = max_size.max(1);
        Self {
            frames: VecDeque::with_capacity(max_size + 1),
            max_size,
            max_lag_us,
        }
    }

    /// Create a buffer sized from playback settings.
    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self::new(settings.frame_buffer_max_size, settings.frame_buffer_max_lag_us)
    }

    /// Insert a frame in timestamp order, evicting the oldest frames while
    /// the buffer is over capacity.
    pub fn push(&mut self, frame: DecodedVideoFrame, timestamp_us: i64) {
        let pos = self.frames.partition_point(|(ts, _)| *ts <= timestamp_us);
        self.frames.insert(pos, (timestamp_us, frame));

        while self.frames.len() > self.max_size {
            if let Some((evicted, frame)) = self.frames.pop_front() {
                tracing::trace!(timestamp_us = evicted, "Evicting frame");
                frame.close();
            }
        }
    }

    /// Copy of the frame to show at `target_us`.
    ///
    /// Picks the latest frame at or before the target; when every frame is
    /// in the future, picks the earliest one. Frames more than `max_lag_us`
    /// behind the target are released afterwards.
    pub fn get_frame_at_time(&mut self, target_us: i64) -> Option<DecodedVideoFrame> {
        let frame = self
            .position_at_or_before(target_us)
            .or(if self.frames.is_empty() { None } else { Some(0) })
            .and_then(|idx| self.frames[idx].1.try_clone());

        self.prune_before(target_us.saturating_sub(self.max_lag_us));
        frame
    }

    /// Timestamp of the frame at or before `target_us`, without copying or
    /// pruning. Future frames are not considered.
    pub fn peek_frame_at_time(&self, target_us: i64) -> Option<i64> {
        self.position_at_or_before(target_us)
            .map(|idx| self.frames[idx].0)
    }

    /// Copy of the earliest buffered frame.
    pub fn get_first_frame(&self) -> Option<DecodedVideoFrame> {
        self.frames.front().and_then(|(_, frame)| frame.try_clone())
    }

    /// Release every buffered frame.
    pub fn clear(&mut self) {
        for (_, frame) in self.frames.drain(..) {
            frame.close();
        }
    }

    /// Buffered timestamps in ascending order.
    pub fn timestamps(&self) -> Vec<i64> {
        self.frames.iter().map(|(ts, _)| *ts).collect()
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn position_at_or_before(&self, target_us: i64) -> Option<usize> {
        match self.frames.partition_point(|(ts, _)| *ts <= target_us) {
            0 => None,
            n => Some(n - 1),
        }
    }

    fn prune_before(&mut self, cutoff_us: i64) {
        while self
            .frames
            .front()
            .is_some_and(|(ts, _)| *ts < cutoff_us)
        {
            if let Some((_, frame)) = self.frames.pop_front() {
                frame.close();
            }
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::from_settings(&PlaybackSettings::default())
    }
}
