//! Property tests for export range selection.

use bytes::Bytes;
use proptest::prelude::*;
use reelcut_media_model::{KeyframeIndex, Sample};
use reelcut_render_engine::range::{select_audio_samples, select_video_samples};

/// Sample table with strictly increasing timestamps; the first sample is
/// always a keyframe, as in a real stream.
fn video_strategy() -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::vec((1u32..5_000, prop::bool::weighted(0.2)), 1..150).prop_map(|entries| {
        let mut cts = 0i64;
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (gap, key))| {
                let sample = Sample::new(cts, gap, 10_000, i == 0 || key, Bytes::new());
                cts += gap as i64;
                sample
            })
            .collect()
    })
}

proptest! {
    /// Decoding starts on a keyframe no later than the first in-range
    /// sample, and every in-range sample is decoded.
    #[test]
    fn decode_starts_on_keyframe_before_range(
        samples in video_strategy(),
        in_us in -100_000i64..80_000_000,
        len_us in 1i64..20_000_000,
    ) {
        let keyframes = KeyframeIndex::from_samples(&samples);
        let out_us = in_us + len_us;
        let in_range: Vec<usize> = (0..samples.len())
            .filter(|&i| {
                let ts = samples[i].timestamp_us();
                ts >= in_us && ts < out_us
            })
            .collect();

        match select_video_samples(&samples, keyframes.as_slice(), in_us, out_us) {
            None => prop_assert!(in_range.is_empty()),
            Some(selection) => {
                let first = in_range[0];
                prop_assert!(samples[selection.decode.start].is_keyframe);
                prop_assert!(selection.decode.start <= first);
                prop_assert!(selection.decode.end > in_range[in_range.len() - 1]);
                prop_assert_eq!(selection.in_range_count, in_range.len());
                prop_assert!(samples[selection.decode.start..first]
                    .iter()
                    .all(|s| s.timestamp_us() < in_us));
            }
        }
    }

    /// Audio selection is exactly the samples in `[in, out)`.
    #[test]
    fn audio_selection_is_exact(
        samples in video_strategy(),
        in_us in -100_000i64..80_000_000,
        len_us in 0i64..20_000_000,
    ) {
        let out_us = in_us + len_us;
        let range = select_audio_samples(&samples, in_us, out_us);
        for (i, sample) in samples.iter().enumerate() {
            let ts = sample.timestamp_us();
            prop_assert_eq!(range.contains(&i), ts >= in_us && ts < out_us);
        }
    }
}
