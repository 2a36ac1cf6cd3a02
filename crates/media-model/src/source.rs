//! Demuxed sources and the sample-table ingestion format.
//!
//! The external demuxer hands the core a [`SourceManifest`]: per-track
//! metadata plus an ordered list of sample entries that point into a single
//! payload blob. [`DemuxedSource::from_manifest`] turns that into sample
//! tables with a keyframe index. A source lives until it is unloaded.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sample::{KeyframeIndex, Sample};

/// Metadata needed to configure a video decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrackInfo {
    /// Codec identifier (e.g. `avc1.64001f`, `raw`).
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Codec-specific configuration record (avcC, hvcC, ...).
    pub description: Option<Bytes>,
}

/// Metadata needed to configure an audio decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackInfo {
    /// Codec identifier (e.g. `mp4a.40.2`, `pcm-f32`).
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Codec-specific configuration record (AudioSpecificConfig, ...).
    pub description: Option<Bytes>,
}

/// A sample table together with its track metadata and keyframe index.
#[derive(Debug, Clone)]
pub struct SampleTrack<I> {
    pub info: I,
    pub samples: Vec<Sample>,
    pub keyframes: KeyframeIndex,
}

pub type VideoSampleTrack = SampleTrack<VideoTrackInfo>;
pub type AudioSampleTrack = SampleTrack<AudioTrackInfo>;

impl<I> SampleTrack<I> {
    /// Create a track, deriving the keyframe index from the samples.
    pub fn new(info: I, samples: Vec<Sample>) -> Self {
        let keyframes = KeyframeIndex::from_samples(&samples);
        Self {
            info,
            samples,
            keyframes,
        }
    }

    /// End of the last sample in microseconds (0 for an empty track).
    pub fn end_us(&self) -> i64 {
        self.samples
            .iter()
            .map(|s| s.timestamp_us() + s.duration_us())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A fully demuxed source: everything the export pipeline needs.
#[derive(Debug, Clone)]
pub struct DemuxedSource {
    /// Human-readable source name (usually the original file name).
    pub name: String,

    /// Source duration in microseconds.
    pub duration_us: i64,

    pub video: Option<VideoSampleTrack>,
    pub audio: Option<AudioSampleTrack>,
}

impl DemuxedSource {
    /// Whether the source carries an audio track with at least one sample.
    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Build sample tables from a manifest and its payload blob.
    ///
    /// Payload slices are zero-copy views into `payload`.
    pub fn from_manifest(manifest: &SourceManifest, payload: Bytes) -> Result<Self, SourceError> {
        let video = manifest
            .video
            .as_ref()
            .map(|track| -> Result<VideoSampleTrack, SourceError> {
                let samples = slice_samples("video", &track.samples, &payload)?;
                Ok(SampleTrack::new(
                    VideoTrackInfo {
                        codec: track.codec.clone(),
                        width: track.width,
                        height: track.height,
                        description: track.description.clone().map(Bytes::from),
                    },
                    samples,
                ))
            })
            .transpose()?;

        let audio = manifest
            .audio
            .as_ref()
            .map(|track| -> Result<AudioSampleTrack, SourceError> {
                if track.sample_rate == 0 || track.channel_count == 0 {
                    return Err(SourceError::Invalid {
                        message: "audio track must have a non-zero sample rate and channel count"
                            .to_string(),
                    });
                }
                let samples = slice_samples("audio", &track.samples, &payload)?;
                Ok(SampleTrack::new(
                    AudioTrackInfo {
                        codec: track.codec.clone(),
                        sample_rate: track.sample_rate,
                        channel_count: track.channel_count,
                        description: track.description.clone().map(Bytes::from),
                    },
                    samples,
                ))
            })
            .transpose()?;

        let derived_duration = video
            .as_ref()
            .map(SampleTrack::end_us)
            .unwrap_or(0)
            .max(audio.as_ref().map(SampleTrack::end_us).unwrap_or(0));

        tracing::debug!(
            name = %manifest.name,
            video_samples = video.as_ref().map(|v| v.samples.len()).unwrap_or(0),
            audio_samples = audio.as_ref().map(|a| a.samples.len()).unwrap_or(0),
            "Source manifest loaded"
        );

        Ok(Self {
            name: manifest.name.clone(),
            duration_us: manifest.duration_us.unwrap_or(derived_duration),
            video,
            audio,
        })
    }

    /// Flatten this source back into a manifest and a payload blob.
    pub fn to_manifest(&self) -> (SourceManifest, Vec<u8>) {
        let mut payload = Vec::new();

        let mut entries = |samples: &[Sample]| -> Vec<ManifestSample> {
            samples
                .iter()
                .map(|s| {
                    let offset = payload.len() as u64;
                    payload.extend_from_slice(&s.data);
                    ManifestSample {
                        cts: s.cts,
                        duration: s.duration,
                        timescale: s.timescale,
                        is_sync: s.is_keyframe,
                        offset,
                        size: s.data.len() as u32,
                    }
                })
                .collect()
        };

        let video = self.video.as_ref().map(|v| ManifestVideoTrack {
            codec: v.info.codec.clone(),
            width: v.info.width,
            height: v.info.height,
            description: v.info.description.as_ref().map(|d| d.to_vec()),
            samples: entries(&v.samples),
        });
        let audio = self.audio.as_ref().map(|a| ManifestAudioTrack {
            codec: a.info.codec.clone(),
            sample_rate: a.info.sample_rate,
            channel_count: a.info.channel_count,
            description: a.info.description.as_ref().map(|d| d.to_vec()),
            samples: entries(&a.samples),
        });

        (
            SourceManifest {
                name: self.name.clone(),
                duration_us: Some(self.duration_us),
                payload: None,
                video,
                audio,
            },
            payload,
        )
    }
}

fn slice_samples(
    track: &'static str,
    entries: &[ManifestSample],
    payload: &Bytes,
) -> Result<Vec<Sample>, SourceError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            if entry.timescale == 0 {
                return Err(SourceError::Invalid {
                    message: format!("{track} sample {index} has a zero timescale"),
                });
            }
            let start = entry.offset as usize;
            let end = start
                .checked_add(entry.size as usize)
                .filter(|end| *end <= payload.len())
                .ok_or(SourceError::PayloadOutOfBounds {
                    track,
                    index,
                    offset: entry.offset,
                    size: entry.size,
                    payload_len: payload.len(),
                })?;
            Ok(Sample::new(
                entry.cts,
                entry.duration,
                entry.timescale,
                entry.is_sync,
                payload.slice(start..end),
            ))
        })
        .collect()
}

/// Sample-table manifest produced by the external demuxer (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    /// Source name, used to derive export file names.
    pub name: String,

    /// Source duration in microseconds. Derived from the samples when absent.
    #[serde(default)]
    pub duration_us: Option<i64>,

    /// Payload file, relative to the manifest, for on-disk manifests.
    #[serde(default)]
    pub payload: Option<PathBuf>,

    #[serde(default)]
    pub video: Option<ManifestVideoTrack>,

    #[serde(default)]
    pub audio: Option<ManifestAudioTrack>,
}

/// Video track section of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestVideoTrack {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub description: Option<Vec<u8>>,
    pub samples: Vec<ManifestSample>,
}

/// Audio track section of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestAudioTrack {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    #[serde(default)]
    pub description: Option<Vec<u8>>,
    pub samples: Vec<ManifestSample>,
}

/// One sample entry: timing plus a byte range in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSample {
    pub cts: i64,
    pub duration: u32,
    pub timescale: u32,
    pub is_sync: bool,
    pub offset: u64,
    pub size: u32,
}

/// Errors raised while turning a manifest into sample tables.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(
        "{track} sample {index} range {offset}+{size} exceeds payload of {payload_len} bytes"
    )]
    PayloadOutOfBounds {
        track: &'static str,
        index: usize,
        offset: u64,
        size: u32,
        payload_len: usize,
    },

    #[error("Invalid manifest: {message}")]
    Invalid { message: String },
}

impl From<SourceError> for reelcut_common::ReelcutError {
    fn from(err: SourceError) -> Self {
        reelcut_common::ReelcutError::demux(err.to_string())
    }
}
