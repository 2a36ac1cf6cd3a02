//! Decoded PCM audio types.

use serde::{Deserialize, Serialize};

use crate::sample::US_PER_SEC;

/// How the samples of a chunk are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLayout {
    /// `L R L R ...`
    Interleaved,
    /// `L L L ... R R R ...`
    Planar,
}

/// A run of decoded `f32` PCM frames starting at `timestamp_us`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioChunk {
    pub timestamp_us: i64,
    pub layout: SampleLayout,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl DecodedAudioChunk {
    /// Create an interleaved chunk.
    pub fn interleaved(
        timestamp_us: i64,
        samples: Vec<f32>,
        sample_rate: u32,
        channel_count: u16,
    ) -> Self {
        Self {
            timestamp_us,
            layout: SampleLayout::Interleaved,
            samples,
            sample_rate,
            channel_count,
        }
    }

    /// Create a planar chunk.
    pub fn planar(timestamp_us: i64, samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            timestamp_us,
            layout: SampleLayout::Planar,
            samples,
            sample_rate,
            channel_count,
        }
    }

    /// Number of PCM frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.samples.len() / self.channel_count as usize
    }

    /// Chunk duration in microseconds.
    pub fn duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as i64 * US_PER_SEC / self.sample_rate as i64
    }

    /// End of the chunk in microseconds (exclusive).
    pub fn end_us(&self) -> i64 {
        self.timestamp_us + self.duration_us()
    }

    /// One sample. `channel` beyond the chunk's channels reuses the last one.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channel_count as usize;
        if channels == 0 || frame >= self.frame_count() {
            return 0.0;
        }
        let channel = channel.min(channels - 1);
        match self.layout {
            SampleLayout::Interleaved => self.samples[frame * channels + channel],
            SampleLayout::Planar => self.samples[channel * self.frame_count() + frame],
        }
    }

    /// Samples as an interleaved vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        match self.layout {
            SampleLayout::Interleaved => self.samples.clone(),
            SampleLayout::Planar => {
                let channels = self.channel_count as usize;
                let frames = self.frame_count();
                let mut out = Vec::with_capacity(frames * channels);
                for frame in 0..frames {
                    for channel in 0..channels {
                        out.push(self.sample(frame, channel));
                    }
                }
                out
            }
        }
    }

    /// A copy of this chunk with its timestamp shifted by `delta_us`.
    pub fn shifted(&self, delta_us: i64) -> Self {
        Self {
            timestamp_us: self.timestamp_us + delta_us,
            ..self.clone()
        }
    }
}

/// Pre-decoded audio for one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAudioSource {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub chunks: Vec<DecodedAudioChunk>,
}

impl DecodedAudioSource {
    pub fn new(sample_rate: u32, channel_count: u16, chunks: Vec<DecodedAudioChunk>) -> Self {
        Self {
            sample_rate,
            channel_count,
            chunks,
        }
    }

    /// A source holding one contiguous interleaved buffer starting at zero.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Self {
        Self::new(
            sample_rate,
            channel_count,
            vec![DecodedAudioChunk::interleaved(
                0,
                samples,
                sample_rate,
                channel_count,
            )],
        )
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|c| c.frame_count() == 0)
    }

    /// Source frame at which `timestamp_us` falls (floor), or `None` when it
    /// does not fit in an `i64`.
    pub fn frame_at(&self, timestamp_us: i64) -> Option<i64> {
        let frame = (timestamp_us as i128 * self.sample_rate as i128).div_euclid(US_PER_SEC as i128);
        i64::try_from(frame).ok()
    }

    /// Render source frames `[start_frame, start_frame + frame_count)` into
    /// one planar buffer per channel.
    ///
    /// Chunks are placed at their own timestamps. Frames no chunk covers stay
    /// silent, frames of a chunk that fall outside the window are skipped, and
    /// later chunks overwrite earlier ones where they overlap. The caller
    /// bounds `frame_count`; nothing outside the window is allocated.
    pub fn render_window(&self, start_frame: i64, frame_count: usize) -> Vec<Vec<f32>> {
        let channels = self.channel_count as usize;
        if channels == 0 || self.sample_rate == 0 || frame_count == 0 {
            return vec![];
        }
        let window_end = start_frame.saturating_add(frame_count as i64);

        let mut planes = vec![vec![0.0f32; frame_count]; channels];
        for chunk in &self.chunks {
            let Some(chunk_start) = self.frame_at(chunk.timestamp_us) else {
                continue;
            };
            let chunk_end = chunk_start.saturating_add(chunk.frame_count() as i64);
            if chunk_end <= start_frame || chunk_start >= window_end {
                continue;
            }

            let first = start_frame.max(chunk_start);
            let last = window_end.min(chunk_end);
            for frame in first..last {
                let src = (frame - chunk_start) as usize;
                let dst = (frame - start_frame) as usize;
                for (channel, plane) in planes.iter_mut().enumerate() {
                    plane[dst] = chunk.sample(src, channel);
                }
            }
        }
        planes
    }
}

/// Output of an offline mix covering exactly `[in_point, out_point)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudioResult {
    pub interleaved_samples: Vec<f32>,
    /// Length of `interleaved_samples` (frames × channels).
    pub total_sample_count: usize,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl MixedAudioResult {
    /// Number of PCM frames.
    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.total_sample_count / self.channel_count as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_frames_and_duration() {
        let chunk = DecodedAudioChunk::interleaved(0, vec![0.0; 96_000], 48_000, 2);
        assert_eq!(chunk.frame_count(), 48_000);
        assert_eq!(chunk.duration_us(), 1_000_000);
        assert_eq!(chunk.end_us(), 1_000_000);
    }

    #[test]
    fn test_planar_sample_access_and_interleave() {
        let chunk = DecodedAudioChunk::planar(0, vec![1.0, 2.0, 10.0, 20.0], 48_000, 2);
        assert_eq!(chunk.sample(1, 0), 2.0);
        assert_eq!(chunk.sample(1, 1), 20.0);
        assert_eq!(chunk.to_interleaved(), vec![1.0, 10.0, 2.0, 20.0]);
    }

    #[test]
    fn test_missing_channel_reuses_last() {
        let mono = DecodedAudioChunk::interleaved(0, vec![0.25, 0.5], 48_000, 1);
        assert_eq!(mono.sample(1, 0), 0.5);
        assert_eq!(mono.sample(1, 1), 0.5);
    }

    #[test]
    fn test_render_window_places_chunks_by_timestamp() {
        let source = DecodedAudioSource::new(
            4,
            1,
            vec![
                DecodedAudioChunk::interleaved(0, vec![0.1, 0.1], 4, 1),
                DecodedAudioChunk::interleaved(1_000_000, vec![0.2, 0.2], 4, 1),
            ],
        );
        let planes = source.render_window(0, 6);
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0], vec![0.1, 0.1, 0.0, 0.0, 0.2, 0.2]);

        // A window in the middle only sees the overlapping frames.
        assert_eq!(source.render_window(1, 4)[0], vec![0.1, 0.0, 0.0, 0.2]);
    }

    #[test]
    fn test_render_window_ignores_far_chunks() {
        let source = DecodedAudioSource::new(
            48_000,
            1,
            vec![
                DecodedAudioChunk::interleaved(0, vec![0.5; 48_000], 48_000, 1),
                DecodedAudioChunk::interleaved(200_000_000_000_000, vec![0.9], 48_000, 1),
                DecodedAudioChunk::interleaved(i64::MAX, vec![0.9], 48_000, 1),
            ],
        );
        let planes = source.render_window(0, 48_000);
        assert_eq!(planes[0].len(), 48_000);
        assert!(planes[0].iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_render_window_drops_audio_before_zero() {
        // 4 Hz: the chunk starts one frame before zero.
        let source = DecodedAudioSource::new(
            4,
            1,
            vec![DecodedAudioChunk::interleaved(
                -250_000,
                vec![0.1, 0.2, 0.3],
                4,
                1,
            )],
        );
        assert_eq!(source.render_window(0, 3)[0], vec![0.2, 0.3, 0.0]);
        assert_eq!(source.frame_at(-250_000), Some(-1));
    }
}
