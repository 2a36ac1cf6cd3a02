//! Built-in uncompressed codecs.
//!
//! `raw` video carries RGBA pixels as the sample payload; every frame is a
//! keyframe. `pcm-f32` audio carries interleaved little-endian `f32`
//! samples. Both finish their work synchronously inside `decode`/`encode`,
//! so `flush` has nothing left to wait for.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::{DecodedAudioChunk, DecodedVideoFrame, Sample, US_PER_SEC};

use crate::backend::{
    AudioDecoder, AudioDecoderConfig, AudioEncoder, AudioEncoderConfig, EncodedChunk,
    VideoDecoder, VideoDecoderConfig, VideoEncoder, VideoEncoderConfig,
};

/// Codec identifier of uncompressed RGBA video.
pub const RAW_VIDEO_CODEC: &str = "raw";

/// Codec identifier of interleaved `f32` PCM audio.
pub const PCM_F32_CODEC: &str = "pcm-f32";

const BYTES_PER_PIXEL: usize = 4;
const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

fn frame_bytes(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

pub struct RawVideoDecoder {
    width: u32,
    height: u32,
    output: mpsc::UnboundedSender<DecodedVideoFrame>,
    closed: bool,
}

impl RawVideoDecoder {
    pub fn new(
        config: &VideoDecoderConfig,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> ReelcutResult<Self> {
        if config.codec != RAW_VIDEO_CODEC {
            return Err(ReelcutError::unsupported_codec(&config.codec));
        }
        if config.coded_width == 0 || config.coded_height == 0 {
            return Err(ReelcutError::invalid_input("raw video needs non-zero dimensions"));
        }
        Ok(Self {
            width: config.coded_width,
            height: config.coded_height,
            output,
            closed: false,
        })
    }
}

#[async_trait]
impl VideoDecoder for RawVideoDecoder {
    fn decode(&mut self, sample: &Sample) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::decode("decoder is closed"));
        }
        let expected = frame_bytes(self.width, self.height);
        if sample.data.len() != expected {
            return Err(ReelcutError::decode(format!(
                "raw frame at {}us has {} bytes, expected {expected}",
                sample.timestamp_us(),
                sample.data.len()
            )));
        }
        let frame = DecodedVideoFrame::new(
            sample.timestamp_us(),
            sample.data.to_vec(),
            self.width,
            self.height,
        )
        .with_duration_us(sample.duration_us());

        // A dropped receiver means the export is being torn down.
        let _ = self.output.send(frame);
        Ok(())
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::decode("decoder is closed"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

pub struct RawVideoEncoder {
    width: u32,
    height: u32,
    output: mpsc::UnboundedSender<EncodedChunk>,
    closed: bool,
}

impl RawVideoEncoder {
    pub fn new(
        config: &VideoEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Self> {
        if config.codec != RAW_VIDEO_CODEC {
            return Err(ReelcutError::unsupported_codec(&config.codec));
        }
        Ok(Self {
            width: config.width,
            height: config.height,
            output,
            closed: false,
        })
    }
}

#[async_trait]
impl VideoEncoder for RawVideoEncoder {
    fn encode(
        &mut self,
        frame: &DecodedVideoFrame,
        timestamp_us: i64,
        _key_frame: bool,
    ) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::encode("encoder is closed"));
        }
        if frame.is_closed() {
            return Err(ReelcutError::encode("cannot encode a released frame"));
        }
        if frame.display_width() != self.width || frame.display_height() != self.height {
            return Err(ReelcutError::encode(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.display_width(),
                frame.display_height(),
                self.width,
                self.height
            )));
        }
        let _ = self.output.send(EncodedChunk {
            timestamp_us,
            duration_us: frame.duration_us().unwrap_or(0),
            is_key: true,
            data: Bytes::copy_from_slice(frame.pixels()),
        });
        Ok(())
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::encode("encoder is closed"));
        }
        Ok(())
    }

    fn decoder_description(&self) -> Option<Bytes> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

pub struct PcmAudioDecoder {
    sample_rate: u32,
    channel_count: u16,
    output: mpsc::UnboundedSender<DecodedAudioChunk>,
    closed: bool,
}

impl PcmAudioDecoder {
    pub fn new(
        config: &AudioDecoderConfig,
        output: mpsc::UnboundedSender<DecodedAudioChunk>,
    ) -> ReelcutResult<Self> {
        if config.codec != PCM_F32_CODEC {
            return Err(ReelcutError::unsupported_codec(&config.codec));
        }
        if config.sample_rate == 0 || config.channel_count == 0 {
            return Err(ReelcutError::invalid_input(
                "pcm audio needs a non-zero sample rate and channel count",
            ));
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            output,
            closed: false,
        })
    }
}

#[async_trait]
impl AudioDecoder for PcmAudioDecoder {
    fn decode(&mut self, sample: &Sample) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::decode("decoder is closed"));
        }
        let frame_size = BYTES_PER_SAMPLE * self.channel_count as usize;
        if sample.data.len() % frame_size != 0 {
            return Err(ReelcutError::decode(format!(
                "pcm sample at {}us has {} bytes, not a multiple of {frame_size}",
                sample.timestamp_us(),
                sample.data.len()
            )));
        }
        let samples = sample
            .data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let _ = self.output.send(DecodedAudioChunk::interleaved(
            sample.timestamp_us(),
            samples,
            self.sample_rate,
            self.channel_count,
        ));
        Ok(())
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::decode("decoder is closed"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// PCM encoder. Converts each chunk to the configured rate (nearest-lower
/// sample) and channel count (missing channels reuse the last one).
pub struct PcmAudioEncoder {
    sample_rate: u32,
    channel_count: u16,
    output: mpsc::UnboundedSender<EncodedChunk>,
    closed: bool,
}

impl PcmAudioEncoder {
    pub fn new(
        config: &AudioEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Self> {
        if config.codec != PCM_F32_CODEC {
            return Err(ReelcutError::unsupported_codec(&config.codec));
        }
        if config.sample_rate == 0 || config.channel_count == 0 {
            return Err(ReelcutError::invalid_input(
                "pcm audio needs a non-zero sample rate and channel count",
            ));
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            output,
            closed: false,
        })
    }
}

#[async_trait]
impl AudioEncoder for PcmAudioEncoder {
    fn encode(&mut self, chunk: &DecodedAudioChunk, timestamp_us: i64) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::encode("encoder is closed"));
        }
        if chunk.sample_rate == 0 {
            return Err(ReelcutError::encode("chunk has a zero sample rate"));
        }

        let in_frames = chunk.frame_count() as u64;
        let out_frames = in_frames * self.sample_rate as u64 / chunk.sample_rate as u64;
        let channels = self.channel_count as usize;

        let mut data = BytesMut::with_capacity(out_frames as usize * channels * BYTES_PER_SAMPLE);
        for j in 0..out_frames {
            let src = (j * chunk.sample_rate as u64 / self.sample_rate as u64) as usize;
            for ch in 0..channels {
                data.put_f32_le(chunk.sample(src, ch));
            }
        }

        let _ = self.output.send(EncodedChunk {
            timestamp_us,
            duration_us: out_frames as i64 * US_PER_SEC / self.sample_rate as i64,
            is_key: true,
            data: data.freeze(),
        });
        Ok(())
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        if self.closed {
            return Err(ReelcutError::encode("encoder is closed"));
        }
        Ok(())
    }

    fn decoder_description(&self) -> Option<Bytes> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Encode interleaved samples as a `pcm-f32` payload.
pub fn pcm_f32_payload(samples: &[f32]) -> Bytes {
    let mut data = BytesMut::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for s in samples {
        data.put_f32_le(*s);
    }
    data.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_config(codec: &str) -> VideoDecoderConfig {
        VideoDecoderConfig {
            codec: codec.to_string(),
            coded_width: 2,
            coded_height: 1,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_raw_decode_emits_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = RawVideoDecoder::new(&video_config("raw"), tx).unwrap();
        let sample = Sample::new(3000, 3000, 90_000, true, Bytes::from(vec![7u8; 8]));
        decoder.decode(&sample).unwrap();
        decoder.flush().await.unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.timestamp_us(), 33_333);
        assert_eq!(frame.duration_us(), Some(33_333));
        assert_eq!(frame.pixels(), &[7u8; 8]);
    }

    #[test]
    fn test_raw_decoder_rejects_other_codecs_and_bad_sizes() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            RawVideoDecoder::new(&video_config("avc1.64001f"), tx.clone()),
            Err(ReelcutError::UnsupportedCodec { .. })
        ));

        let mut decoder = RawVideoDecoder::new(&video_config("raw"), tx).unwrap();
        let short = Sample::new(0, 1, 30, true, Bytes::from_static(b"abc"));
        assert!(matches!(decoder.decode(&short), Err(ReelcutError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_closed_decoder_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut decoder = RawVideoDecoder::new(&video_config("raw"), tx).unwrap();
        decoder.close();
        assert!(decoder.flush().await.is_err());
    }

    #[test]
    fn test_pcm_decode_and_encode_round_trip() {
        let (dtx, mut drx) = mpsc::unbounded_channel();
        let mut decoder = PcmAudioDecoder::new(
            &AudioDecoderConfig {
                codec: PCM_F32_CODEC.to_string(),
                sample_rate: 4,
                channel_count: 2,
                description: None,
            },
            dtx,
        )
        .unwrap();
        let payload = pcm_f32_payload(&[0.1, -0.1, 0.2, -0.2]);
        decoder
            .decode(&Sample::new(0, 2, 4, true, payload.clone()))
            .unwrap();
        let chunk = drx.try_recv().unwrap();
        assert_eq!(chunk.frame_count(), 2);

        let (etx, mut erx) = mpsc::unbounded_channel();
        let mut encoder = PcmAudioEncoder::new(
            &AudioEncoderConfig {
                codec: PCM_F32_CODEC.to_string(),
                sample_rate: 4,
                channel_count: 2,
                bitrate: 0,
            },
            etx,
        )
        .unwrap();
        encoder.encode(&chunk, 250_000).unwrap();
        let encoded = erx.try_recv().unwrap();
        assert_eq!(encoded.data, payload);
        assert_eq!(encoded.timestamp_us, 250_000);
        assert_eq!(encoded.duration_us, 500_000);
        assert!(encoded.is_key);
    }

    #[test]
    fn test_pcm_encoder_converts_rate_and_channels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut encoder = PcmAudioEncoder::new(
            &AudioEncoderConfig {
                codec: PCM_F32_CODEC.to_string(),
                sample_rate: 8,
                channel_count: 2,
                bitrate: 0,
            },
            tx,
        )
        .unwrap();
        let mono = DecodedAudioChunk::interleaved(0, vec![0.5, 0.25], 4, 1);
        encoder.encode(&mono, 0).unwrap();

        let encoded = rx.try_recv().unwrap();
        assert_eq!(encoded.data, pcm_f32_payload(&[0.5, 0.5, 0.5, 0.5, 0.25, 0.25, 0.25, 0.25]));
    }
}
