//! Selecting the samples an export range needs.

use std::ops::Range;

use reelcut_media_model::Sample;
use reelcut_processing_core::{find_keyframe_before, find_sample_at_time};

/// Video samples to decode for `[in, out)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSelection {
    /// Samples to submit to the decoder, starting at a keyframe.
    pub decode: Range<usize>,

    /// How many of them fall inside `[in, out)` and will be encoded.
    pub in_range_count: usize,
}

impl VideoSelection {
    /// Samples decoded only to reach the first in-range frame.
    pub fn preroll_count(&self) -> usize {
        self.decode.len() - self.in_range_count
    }
}

fn in_range(sample: &Sample, in_point_us: i64, out_point_us: i64) -> bool {
    let ts = sample.timestamp_us();
    ts >= in_point_us && ts < out_point_us
}

/// Pick the video samples for `[in_point_us, out_point_us)`.
///
/// Decoding starts at the keyframe at or before the first in-range sample
/// and runs through the last sample before `out_point_us`. Returns `None`
/// when no sample is inside the range.
pub fn select_video_samples(
    samples: &[Sample],
    keyframes: &[usize],
    in_point_us: i64,
    out_point_us: i64,
) -> Option<VideoSelection> {
    let first = find_sample_at_time(samples, in_point_us)?;
    let start = find_keyframe_before(keyframes, first).min(first);

    let end = samples[start..]
        .iter()
        .rposition(|s| s.timestamp_us() < out_point_us)
        .map(|i| start + i + 1)?;

    let in_range_count = samples[start..end]
        .iter()
        .filter(|s| in_range(s, in_point_us, out_point_us))
        .count();
    if in_range_count == 0 {
        return None;
    }

    Some(VideoSelection {
        decode: start..end,
        in_range_count,
    })
}

/// Audio samples whose timestamp lies in `[in_point_us, out_point_us)`.
/// Every audio sample decodes on its own, so there is no pre-roll.
pub fn select_audio_samples(samples: &[Sample], in_point_us: i64, out_point_us: i64) -> Range<usize> {
    let start = samples.partition_point(|s| s.timestamp_us() < in_point_us);
    let end = samples.partition_point(|s| s.timestamp_us() < out_point_us);
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// 10 fps video, keyframe every 5 samples.
    fn video(count: usize) -> (Vec<Sample>, Vec<usize>) {
        let samples: Vec<Sample> = (0..count)
            .map(|i| Sample::new(i as i64 * 100, 100, 1_000, i % 5 == 0, Bytes::new()))
            .collect();
        let keyframes = (0..count).filter(|i| i % 5 == 0).collect();
        (samples, keyframes)
    }

    #[test]
    fn test_selection_prerolls_to_keyframe() {
        let (samples, keyframes) = video(20);
        // [0.7s, 1.2s) covers samples 7..12; decoding starts at keyframe 5.
        let sel = select_video_samples(&samples, &keyframes, 700_000, 1_200_000).unwrap();
        assert_eq!(sel.decode, 5..12);
        assert_eq!(sel.in_range_count, 5);
        assert_eq!(sel.preroll_count(), 2);
    }

    #[test]
    fn test_selection_starting_on_keyframe_has_no_preroll() {
        let (samples, keyframes) = video(20);
        let sel = select_video_samples(&samples, &keyframes, 1_000_000, 1_300_000).unwrap();
        assert_eq!(sel.decode, 10..13);
        assert_eq!(sel.preroll_count(), 0);
    }

    #[test]
    fn test_range_outside_media_selects_nothing() {
        let (samples, keyframes) = video(10);
        assert!(select_video_samples(&samples, &keyframes, 5_000_000, 6_000_000).is_none());
        assert!(select_video_samples(&[], &[], 0, 1_000_000).is_none());
        // Between two samples.
        assert!(select_video_samples(&samples, &keyframes, 110_000, 150_000).is_none());
    }

    #[test]
    fn test_audio_selection_is_half_open() {
        let (samples, _) = video(10);
        assert_eq!(select_audio_samples(&samples, 200_000, 500_000), 2..5);
        assert_eq!(select_audio_samples(&samples, 2_000_000, 3_000_000), 10..10);
    }
}
