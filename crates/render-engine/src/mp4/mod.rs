//! Progressive MP4 muxer.
//!
//! Chunks are appended to per-track buffers as they are produced. On
//! `finalize` the file is laid out as `ftyp | moov | mdat` so it can start
//! playing before it is fully downloaded. Each track's media is stored as
//! one contiguous chunk inside `mdat`, video first.

mod boxes;

use bytes::{BufMut, Bytes, BytesMut};

use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::{us_to_ticks, US_PER_SEC};

use crate::backend::{EncodedChunk, MuxAudioTrack, MuxVideoTrack, Muxer, MuxerConfig};
use crate::raw::{PCM_F32_CODEC, RAW_VIDEO_CODEC};
use boxes::SampleEntry;

/// Media timescale of the video track.
pub const VIDEO_TIMESCALE: u32 = 90_000;

#[derive(Debug, Clone, Copy)]
enum VideoEntry {
    Avc,
    Hevc,
    Vp9,
    Av1,
    Raw,
}

#[derive(Debug, Clone, Copy)]
enum AudioEntry {
    Aac,
    Opus,
    Float32,
}

fn video_entry(codec: &str) -> ReelcutResult<VideoEntry> {
    let family = codec.split('.').next().unwrap_or(codec);
    match family {
        "avc1" | "avc3" => Ok(VideoEntry::Avc),
        "hvc1" | "hev1" => Ok(VideoEntry::Hevc),
        "vp09" => Ok(VideoEntry::Vp9),
        "av01" => Ok(VideoEntry::Av1),
        RAW_VIDEO_CODEC => Ok(VideoEntry::Raw),
        _ => Err(ReelcutError::unsupported_codec(codec)),
    }
}

fn audio_entry(codec: &str) -> ReelcutResult<AudioEntry> {
    let family = codec.split('.').next().unwrap_or(codec);
    match family {
        "mp4a" => Ok(AudioEntry::Aac),
        "opus" => Ok(AudioEntry::Opus),
        PCM_F32_CODEC => Ok(AudioEntry::Float32),
        _ => Err(ReelcutError::unsupported_codec(codec)),
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSample {
    timestamp_us: i64,
    duration_us: i64,
    size: u32,
    is_key: bool,
}

#[derive(Debug, Default)]
struct TrackBuffer {
    samples: Vec<PendingSample>,
    data: BytesMut,
}

impl TrackBuffer {
    fn push(&mut self, kind: &str, chunk: &EncodedChunk) -> ReelcutResult<()> {
        if chunk.timestamp_us < 0 {
            return Err(ReelcutError::mux(format!(
                "{kind} chunk has negative timestamp {}us",
                chunk.timestamp_us
            )));
        }
        if let Some(last) = self.samples.last() {
            if chunk.timestamp_us < last.timestamp_us {
                return Err(ReelcutError::mux(format!(
                    "{kind} chunk at {}us arrived after {}us",
                    chunk.timestamp_us, last.timestamp_us
                )));
            }
        }
        let size = u32::try_from(chunk.data.len())
            .map_err(|_| ReelcutError::mux(format!("{kind} chunk exceeds 4 GiB")))?;
        self.samples.push(PendingSample {
            timestamp_us: chunk.timestamp_us,
            duration_us: chunk.duration_us.max(0),
            size,
            is_key: chunk.is_key,
        });
        self.data.put_slice(&chunk.data);
        Ok(())
    }

    fn start_us(&self) -> i64 {
        self.samples.first().map(|s| s.timestamp_us).unwrap_or(0)
    }

    /// Sample entries in `timescale` units. Durations come from timestamp
    /// deltas; the last sample keeps its own duration, or the previous delta
    /// when it has none.
    fn entries(&self, timescale: u32) -> Vec<SampleEntry> {
        let ticks: Vec<i64> = self
            .samples
            .iter()
            .map(|s| us_to_ticks(s.timestamp_us, timescale))
            .collect();

        let mut entries = Vec::with_capacity(self.samples.len());
        let mut previous = 0u32;
        for (i, sample) in self.samples.iter().enumerate() {
            let duration = match ticks.get(i + 1) {
                Some(next) => (next - ticks[i]).max(0) as u32,
                None if sample.duration_us > 0 => us_to_ticks(sample.duration_us, timescale) as u32,
                None => previous,
            };
            previous = duration;
            entries.push(SampleEntry {
                size: sample.size,
                duration,
                is_sync: sample.is_key,
            });
        }
        entries
    }
}

fn media_duration(entries: &[SampleEntry]) -> u64 {
    entries.iter().map(|e| e.duration as u64).sum()
}

fn to_movie_ms(ticks: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    ticks * boxes::MOVIE_TIMESCALE as u64 / timescale as u64
}

/// MP4 muxer for one video track and an optional audio track.
pub struct Mp4Muxer {
    video_track: MuxVideoTrack,
    video_entry: VideoEntry,
    audio_track: Option<(MuxAudioTrack, AudioEntry)>,
    video: TrackBuffer,
    audio: TrackBuffer,
}

impl Mp4Muxer {
    /// Fails with `UnsupportedCodec` for codecs without an MP4 mapping.
    pub fn new(config: &MuxerConfig) -> ReelcutResult<Self> {
        let video_entry = video_entry(&config.video.codec)?;
        let audio_track = config
            .audio
            .as_ref()
            .map(|a| audio_entry(&a.codec).map(|e| (a.clone(), e)))
            .transpose()?;
        Ok(Self {
            video_track: config.video.clone(),
            video_entry,
            audio_track,
            video: TrackBuffer::default(),
            audio: TrackBuffer::default(),
        })
    }

    fn video_sample_entry(&self) -> Vec<u8> {
        let t = &self.video_track;
        let description = t.description.as_deref();
        let (fourcc, config_type): (&[u8; 4], &[u8; 4]) = match self.video_entry {
            VideoEntry::Avc => (b"avc1", b"avcC"),
            VideoEntry::Hevc => (b"hvc1", b"hvcC"),
            VideoEntry::Vp9 => (b"vp09", b"vpcC"),
            VideoEntry::Av1 => (b"av01", b"av1C"),
            VideoEntry::Raw => (b"raw ", b"    "),
        };
        let config = match self.video_entry {
            VideoEntry::Raw => None,
            _ => description.map(|d| (config_type, d)),
        };
        boxes::write_visual_sample_entry(fourcc, t.width, t.height, config)
    }

    fn audio_sample_entry(&self, track: &MuxAudioTrack, entry: AudioEntry) -> Vec<u8> {
        match entry {
            AudioEntry::Aac => {
                let esds = boxes::esds_payload(
                    track.description.as_deref().unwrap_or(&[]),
                    track.bitrate,
                );
                boxes::write_audio_sample_entry(
                    b"mp4a",
                    track.sample_rate,
                    track.channel_count,
                    16,
                    Some((b"esds", esds.as_slice())),
                )
            }
            AudioEntry::Opus => {
                let dops = match &track.description {
                    Some(d) => d.to_vec(),
                    None => boxes::dops_payload(track.sample_rate, track.channel_count),
                };
                boxes::write_audio_sample_entry(
                    b"Opus",
                    48_000,
                    track.channel_count,
                    16,
                    Some((b"dOps", dops.as_slice())),
                )
            }
            AudioEntry::Float32 => boxes::write_audio_sample_entry(
                b"fl32",
                track.sample_rate,
                track.channel_count,
                32,
                None,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_trak(
        track_id: u32,
        handler: &[u8; 4],
        handler_name: &str,
        timescale: u32,
        buffer: &TrackBuffer,
        sample_entry: &[u8],
        chunk_offset: u64,
        dimensions: Option<(u32, u32)>,
    ) -> Vec<u8> {
        let entries = buffer.entries(timescale);
        let duration = media_duration(&entries);
        let duration_ms = to_movie_ms(duration, timescale);
        let start_ms = (buffer.start_us().max(0) as u64) * boxes::MOVIE_TIMESCALE as u64
            / US_PER_SEC as u64;

        let (width, height) = dimensions.unwrap_or((0, 0));
        let tkhd = boxes::write_tkhd(
            track_id,
            start_ms + duration_ms,
            width,
            height,
            dimensions.is_none(),
        );
        let edts = if start_ms > 0 {
            boxes::write_edts(start_ms, duration_ms)
        } else {
            Vec::new()
        };

        let mdhd = boxes::write_mdhd(timescale, duration);
        let hdlr = boxes::write_hdlr(handler, handler_name);
        let media_header = if dimensions.is_some() {
            boxes::write_vmhd()
        } else {
            boxes::write_smhd()
        };
        let dinf = boxes::write_dinf();
        let stsd = boxes::write_stsd(sample_entry);
        let stbl = boxes::write_stbl(&stsd, &entries, chunk_offset);
        let minf = boxes::write_container_box(b"minf", &[&media_header, &dinf, &stbl]);
        let mdia = boxes::write_container_box(b"mdia", &[&mdhd, &hdlr, &minf]);
        boxes::write_container_box(b"trak", &[&tkhd, &edts, &mdia])
    }

    fn write_moov(&self, data_start: u64) -> Vec<u8> {
        let video_trak = Self::write_trak(
            1,
            b"vide",
            "VideoHandler",
            VIDEO_TIMESCALE,
            &self.video,
            &self.video_sample_entry(),
            data_start,
            Some((self.video_track.width, self.video_track.height)),
        );

        let audio_trak = match &self.audio_track {
            Some((track, entry)) if !self.audio.samples.is_empty() => Self::write_trak(
                2,
                b"soun",
                "SoundHandler",
                track.sample_rate,
                &self.audio,
                &self.audio_sample_entry(track, *entry),
                data_start + self.video.data.len() as u64,
                None,
            ),
            _ => Vec::new(),
        };

        let video_ms = to_movie_ms(
            media_duration(&self.video.entries(VIDEO_TIMESCALE)),
            VIDEO_TIMESCALE,
        ) + self.video.start_us().max(0) as u64 / 1_000;
        let audio_ms = match &self.audio_track {
            Some((track, _)) if !self.audio.samples.is_empty() => {
                to_movie_ms(media_duration(&self.audio.entries(track.sample_rate)), track.sample_rate)
                    + self.audio.start_us().max(0) as u64 / 1_000
            }
            _ => 0,
        };
        let next_track_id = if audio_trak.is_empty() { 2 } else { 3 };
        let mvhd = boxes::write_mvhd(video_ms.max(audio_ms), next_track_id);

        boxes::write_container_box(b"moov", &[&mvhd, &video_trak, &audio_trak])
    }
}

impl Muxer for Mp4Muxer {
    fn add_video_chunk(&mut self, chunk: &EncodedChunk) -> ReelcutResult<()> {
        self.video.push("video", chunk)
    }

    fn add_audio_chunk(&mut self, chunk: &EncodedChunk) -> ReelcutResult<()> {
        if self.audio_track.is_none() {
            return Err(ReelcutError::mux("muxer was configured without an audio track"));
        }
        self.audio.push("audio", chunk)
    }

    fn buffered_bytes(&self) -> u64 {
        (self.video.data.len() + self.audio.data.len()) as u64
    }

    fn finalize(self: Box<Self>) -> ReelcutResult<Bytes> {
        if self.video.samples.is_empty() {
            return Err(ReelcutError::mux("no video chunks were written"));
        }

        let ftyp = boxes::write_ftyp();
        let payload_len = self.buffered_bytes();
        let mdat_header = boxes::write_mdat_header(payload_len);

        // Offsets are 64-bit, so the moov size does not depend on them.
        let moov_len = self.write_moov(0).len() as u64;
        let data_start = ftyp.len() as u64 + moov_len + mdat_header.len() as u64;
        let moov = self.write_moov(data_start);

        let mut out = BytesMut::with_capacity(data_start as usize + payload_len as usize);
        out.put_slice(&ftyp);
        out.put_slice(&moov);
        out.put_slice(&mdat_header);
        out.put_slice(&self.video.data);
        out.put_slice(&self.audio.data);

        tracing::debug!(
            video_samples = self.video.samples.len(),
            audio_samples = self.audio.samples.len(),
            bytes = out.len(),
            "MP4 finalized"
        );
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    /// Top-level boxes as (type, start, size).
    fn top_level(data: &[u8]) -> Vec<([u8; 4], usize, usize)> {
        let mut boxes = Vec::new();
        let mut pos = 0;
        while pos + 8 <= data.len() {
            let size = read_u32(data, pos) as usize;
            let mut kind = [0u8; 4];
            kind.copy_from_slice(&data[pos + 4..pos + 8]);
            boxes.push((kind, pos, size));
            pos += size;
        }
        boxes
    }

    fn config(audio: bool) -> MuxerConfig {
        MuxerConfig {
            video: MuxVideoTrack {
                codec: "raw".to_string(),
                width: 1,
                height: 1,
                description: None,
            },
            audio: audio.then(|| MuxAudioTrack {
                codec: "pcm-f32".to_string(),
                sample_rate: 48_000,
                channel_count: 2,
                bitrate: 0,
                description: None,
            }),
        }
    }

    fn chunk(ts: i64, data: &'static [u8]) -> EncodedChunk {
        EncodedChunk {
            timestamp_us: ts,
            duration_us: 33_333,
            is_key: true,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_layout_is_ftyp_moov_mdat() {
        let mut muxer = Box::new(Mp4Muxer::new(&config(true)).unwrap());
        muxer.add_video_chunk(&chunk(0, b"VVVV")).unwrap();
        muxer.add_video_chunk(&chunk(33_333, b"WWWW")).unwrap();
        muxer.add_audio_chunk(&chunk(0, b"AAAAAAAA")).unwrap();
        assert_eq!(muxer.buffered_bytes(), 16);

        let file = muxer.finalize().unwrap();
        let boxes = top_level(&file);
        let kinds: Vec<&[u8; 4]> = boxes.iter().map(|(k, _, _)| k).collect();
        assert_eq!(kinds, vec![b"ftyp", b"moov", b"mdat"]);

        let (_, mdat_start, mdat_size) = boxes[2];
        assert_eq!(mdat_size, 8 + 16);
        assert_eq!(&file[mdat_start + 8..mdat_start + 16], b"VVVVWWWW");

        // The video chunk offset points at the first video byte.
        let co64 = file.windows(4).position(|w| w == b"co64").unwrap();
        let offset = u64::from_be_bytes(file[co64 + 12..co64 + 20].try_into().unwrap());
        assert_eq!(offset as usize, mdat_start + 8);
    }

    #[test]
    fn test_sample_entries_follow_codec() {
        let mut muxer = Box::new(Mp4Muxer::new(&config(true)).unwrap());
        muxer.add_video_chunk(&chunk(0, b"V")).unwrap();
        muxer.add_audio_chunk(&chunk(0, b"A")).unwrap();
        let file = muxer.finalize().unwrap();
        assert!(file.windows(4).any(|w| w == b"raw "));
        assert!(file.windows(4).any(|w| w == b"fl32"));
        assert_eq!(file.windows(4).filter(|w| *w == b"trak").count(), 2);
    }

    #[test]
    fn test_unknown_codec_is_unsupported() {
        let mut cfg = config(false);
        cfg.video.codec = "theora".to_string();
        assert!(matches!(
            Mp4Muxer::new(&cfg),
            Err(ReelcutError::UnsupportedCodec { .. })
        ));
    }

    #[test]
    fn test_out_of_order_chunk_is_rejected() {
        let mut muxer = Mp4Muxer::new(&config(false)).unwrap();
        muxer.add_video_chunk(&chunk(100, b"V")).unwrap();
        assert!(matches!(
            muxer.add_video_chunk(&chunk(50, b"V")),
            Err(ReelcutError::Mux { .. })
        ));
        assert!(muxer.add_audio_chunk(&chunk(0, b"A")).is_err());
    }

    #[test]
    fn test_durations_come_from_timestamp_deltas() {
        let mut track = TrackBuffer::default();
        track.push("video", &chunk(0, b"a")).unwrap();
        track.push("video", &chunk(40_000, b"b")).unwrap();
        track.push("video", &chunk(80_000, b"c")).unwrap();
        let entries = track.entries(VIDEO_TIMESCALE);
        assert_eq!(entries[0].duration, 3_600);
        assert_eq!(entries[1].duration, 3_600);
        // Last sample uses its own duration (33_333us).
        assert_eq!(entries[2].duration, 2_999);
    }

    #[test]
    fn test_empty_video_cannot_finalize() {
        let muxer = Box::new(Mp4Muxer::new(&config(false)).unwrap());
        assert!(muxer.finalize().is_err());
    }
}
