//! Time-based random access into sample tables.
//!
//! Both lookups are O(log n) and never panic. An empty table is the only
//! case without an answer; everything else clamps to the nearest valid
//! index.

use reelcut_media_model::Sample;

/// Index of the first sample whose timestamp is at or after `target_us`.
///
/// Targets before the first sample map to `0`; targets past the last sample
/// map to the last index. Returns `None` for an empty table.
pub fn find_sample_at_time(samples: &[Sample], target_us: i64) -> Option<usize> {
    if samples.is_empty() {
        return None;
    }
    let idx = samples.partition_point(|s| s.timestamp_us() < target_us);
    Some(idx.min(samples.len() - 1))
}

/// Largest keyframe index that is `<= sample_idx`.
///
/// Returns `0` when `keyframes` is empty or no keyframe precedes the sample,
/// so decoding always has a place to start.
pub fn find_keyframe_before(keyframes: &[usize], sample_idx: usize) -> usize {
    let count = keyframes.partition_point(|&k| k <= sample_idx);
    if count == 0 {
        0
    } else {
        keyframes[count - 1]
    }
}

/// Sample index a decoder must start from to produce the frame at
/// `target_us`: the sample at that time rolled back to its keyframe.
pub fn find_decode_start(samples: &[Sample], keyframes: &[usize], target_us: i64) -> Option<usize> {
    let idx = find_sample_at_time(samples, target_us)?;
    Some(find_keyframe_before(keyframes, idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// 30 fps track at timescale 90 kHz with a keyframe every 10 frames.
    fn track(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample::new(i as i64 * 3000, 3000, 90_000, i % 10 == 0, Bytes::new()))
            .collect()
    }

    #[test]
    fn test_empty_table_has_no_sample() {
        assert_eq!(find_sample_at_time(&[], 0), None);
        assert_eq!(find_decode_start(&[], &[], 1_000), None);
    }

    #[test]
    fn test_exact_and_between_timestamps() {
        let samples = track(30);
        // Sample 3 sits at 100_000us.
        assert_eq!(find_sample_at_time(&samples, 100_000), Some(3));
        // Just after sample 3 resolves to the next sample.
        assert_eq!(find_sample_at_time(&samples, 100_001), Some(4));
    }

    #[test]
    fn test_out_of_range_targets_clamp() {
        let samples = track(30);
        assert_eq!(find_sample_at_time(&samples, -5_000_000), Some(0));
        assert_eq!(find_sample_at_time(&samples, 60_000_000), Some(29));
    }

    #[test]
    fn test_keyframe_before() {
        let keyframes = [0, 10, 20];
        assert_eq!(find_keyframe_before(&keyframes, 0), 0);
        assert_eq!(find_keyframe_before(&keyframes, 9), 0);
        assert_eq!(find_keyframe_before(&keyframes, 10), 10);
        assert_eq!(find_keyframe_before(&keyframes, 25), 20);
    }

    #[test]
    fn test_keyframe_before_without_preceding_keyframe() {
        assert_eq!(find_keyframe_before(&[], 7), 0);
        assert_eq!(find_keyframe_before(&[5, 9], 3), 0);
    }

    #[test]
    fn test_decode_start_rolls_back_to_keyframe() {
        let samples = track(30);
        let keyframes: Vec<usize> = (0..30).filter(|i| i % 10 == 0).collect();
        // 500_000us is sample 15, whose keyframe is 10.
        assert_eq!(find_decode_start(&samples, &keyframes, 500_000), Some(10));
    }
}
