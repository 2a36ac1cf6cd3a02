//! Offline mixdown of audio tracks over an export range.
//!
//! The output buffer covers exactly `[in_point, out_point)` at the requested
//! rate and channel count. Every clip that intersects the range is copied
//! into it at its timeline position, scaled by its volume and summed with
//! whatever is already there. The sum is clamped to `[-1, 1]` at the end.
//!
//! Gaps in the source material are silence, never errors.

use std::collections::HashMap;

use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::{DecodedAudioSource, MixedAudioResult, Track, TrackKind, US_PER_SEC};

/// Upper bound on mixed samples (all channels) when none is given:
/// 512 MiB of `f32`.
pub const DEFAULT_MAX_MIX_SAMPLES: usize = 512 * 1024 * 1024 / std::mem::size_of::<f32>();

/// Mixdown parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MixConfig {
    /// Start of the mixed range on the timeline (µs, inclusive).
    pub in_point_us: i64,

    /// End of the mixed range on the timeline (µs, exclusive).
    pub out_point_us: i64,

    /// Output sample rate.
    pub sample_rate: u32,

    /// Output channel count.
    pub channels: u16,

    /// Refuse to mix when the output would hold more samples than this.
    pub max_samples: usize,
}

impl MixConfig {
    pub fn new(in_point_us: i64, out_point_us: i64, sample_rate: u32, channels: u16) -> Self {
        Self {
            in_point_us,
            out_point_us,
            sample_rate,
            channels,
            max_samples: DEFAULT_MAX_MIX_SAMPLES,
        }
    }

    fn validate(&self) -> ReelcutResult<()> {
        if self.out_point_us <= self.in_point_us {
            return Err(ReelcutError::invalid_input(format!(
                "mix range [{}us, {}us) is empty",
                self.in_point_us, self.out_point_us
            )));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ReelcutError::invalid_input(
                "mix sample rate and channel count must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Frames covering `us` microseconds at `sample_rate` (floor).
fn frames_for(us: i64, sample_rate: u32) -> i64 {
    (us as i128 * sample_rate as i128).div_euclid(US_PER_SEC as i128) as i64
}

/// Mix every audio track into one interleaved buffer.
///
/// Clips whose source is missing or empty contribute silence. Only an invalid
/// `config` or an output larger than `config.max_samples` is an error.
pub fn mix_audio_tracks(
    tracks: &[Track],
    sources: &HashMap<String, DecodedAudioSource>,
    config: &MixConfig,
) -> ReelcutResult<MixedAudioResult> {
    config.validate()?;

    let channels = config.channels as usize;
    let total_frames = frames_for(config.out_point_us - config.in_point_us, config.sample_rate);
    let total_samples = usize::try_from(total_frames)
        .ok()
        .and_then(|frames| frames.checked_mul(channels))
        .filter(|samples| *samples <= config.max_samples)
        .ok_or_else(|| {
            ReelcutError::resource_exhausted(format!(
                "mix of {total_frames} frames x {channels} channels exceeds {} samples",
                config.max_samples
            ))
        })?;

    let mut output: Vec<f32> = Vec::new();
    output.try_reserve_exact(total_samples).map_err(|e| {
        ReelcutError::resource_exhausted(format!("cannot allocate mix buffer: {e}"))
    })?;
    output.resize(total_samples, 0.0);

    let mut mixed_clips = 0usize;

    for track in tracks.iter().filter(|t| t.kind == TrackKind::Audio) {
        for clip in &track.clips {
            let Some((overlap_start, overlap_end)) =
                clip.overlap(config.in_point_us, config.out_point_us)
            else {
                continue;
            };
            let Some(source) = sources.get(&clip.source_id) else {
                tracing::debug!(clip = %clip.id, source = %clip.source_id, "No decoded audio for clip");
                continue;
            };
            if source.is_empty() || source.sample_rate == 0 || source.channel_count == 0 {
                continue;
            }

            let dst_start = frames_for(overlap_start - config.in_point_us, config.sample_rate);
            let dst_end =
                frames_for(overlap_end - config.in_point_us, config.sample_rate).min(total_frames);
            let needed = dst_end - dst_start;
            if needed <= 0 {
                continue;
            }

            let src_rate = source.sample_rate as i128;
            let out_rate = config.sample_rate as i128;
            let src_start = frames_for(clip.timeline_to_source_us(overlap_start), source.sample_rate);
            // Nearest-lower source frame at the same instant as output frame `j`.
            let src_frame_for = |j: i64| src_start as i128 + j as i128 * src_rate / out_rate;

            // Only the source frames this clip reads are rendered. Audio
            // before source time zero is never played.
            let window_start = src_start.max(0) as i128;
            let window_end = (src_frame_for(needed - 1) + 1)
                .min(frames_for(clip.trim_out_us, source.sample_rate) as i128);
            if window_end <= window_start {
                continue;
            }
            let window_frames = usize::try_from(window_end - window_start)
                .ok()
                .filter(|frames| {
                    frames
                        .checked_mul(source.channel_count as usize)
                        .is_some_and(|samples| samples <= config.max_samples)
                })
                .ok_or_else(|| {
                    ReelcutError::resource_exhausted(format!(
                        "clip {} reads {} source frames, over the {} sample limit",
                        clip.id,
                        window_end - window_start,
                        config.max_samples
                    ))
                })?;
            let window_start = window_start as i64;
            let planes = source.render_window(window_start, window_frames);
            if planes.is_empty() {
                continue;
            }

            for j in 0..needed {
                let src_frame = src_frame_for(j);
                if src_frame < window_start as i128 {
                    continue;
                }
                if src_frame >= window_end {
                    break;
                }
                let offset = (src_frame - window_start as i128) as usize;
                let dst = (dst_start + j) as usize * channels;
                for (ch, slot) in output[dst..dst + channels].iter_mut().enumerate() {
                    let plane = &planes[ch.min(planes.len() - 1)];
                    *slot += plane[offset] * clip.volume;
                }
            }
            mixed_clips += 1;
        }
    }

    for sample in &mut output {
        *sample = sample.clamp(-1.0, 1.0);
    }

    tracing::debug!(
        frames = total_frames,
        channels,
        clips = mixed_clips,
        "Audio mixdown complete"
    );

    Ok(MixedAudioResult {
        total_sample_count: output.len(),
        interleaved_samples: output,
        sample_rate: config.sample_rate,
        channel_count: config.channels,
    })
}
