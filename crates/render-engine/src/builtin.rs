//! Backend built from the codecs and containers shipped in this crate.

use tokio::sync::mpsc;

use reelcut_common::error::ReelcutResult;
use reelcut_media_model::{DecodedAudioChunk, DecodedVideoFrame};

use crate::backend::{
    AudioDecoder, AudioDecoderConfig, AudioEncoder, AudioEncoderConfig, Demuxer, EncodedChunk,
    MediaBackend, Muxer, MuxerConfig, VideoDecoder, VideoDecoderConfig, VideoEncoder,
    VideoEncoderConfig,
};
use crate::bundle::BundleDemuxer;
use crate::mp4::Mp4Muxer;
use crate::raw::{
    PcmAudioDecoder, PcmAudioEncoder, RawVideoDecoder, RawVideoEncoder, PCM_F32_CODEC,
    RAW_VIDEO_CODEC,
};

/// `raw` video, `pcm-f32` audio, sample bundles in and MP4 out.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl BuiltinBackend {
    pub fn new() -> Self {
        Self
    }

    /// Whether `codec` can be decoded and encoded by this backend.
    pub fn supports_codec(codec: &str) -> bool {
        codec == RAW_VIDEO_CODEC || codec == PCM_F32_CODEC
    }
}

impl MediaBackend for BuiltinBackend {
    fn name(&self) -> &str {
        "builtin"
    }

    fn demuxer(&self) -> ReelcutResult<Box<dyn Demuxer>> {
        Ok(Box::new(BundleDemuxer))
    }

    fn video_decoder(
        &self,
        config: &VideoDecoderConfig,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> ReelcutResult<Box<dyn VideoDecoder>> {
        Ok(Box::new(RawVideoDecoder::new(config, output)?))
    }

    fn video_encoder(
        &self,
        config: &VideoEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(RawVideoEncoder::new(config, output)?))
    }

    fn audio_decoder(
        &self,
        config: &AudioDecoderConfig,
        output: mpsc::UnboundedSender<DecodedAudioChunk>,
    ) -> ReelcutResult<Box<dyn AudioDecoder>> {
        Ok(Box::new(PcmAudioDecoder::new(config, output)?))
    }

    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(PcmAudioEncoder::new(config, output)?))
    }

    fn muxer(&self, config: &MuxerConfig) -> ReelcutResult<Box<dyn Muxer>> {
        Ok(Box::new(Mp4Muxer::new(config)?))
    }
}
