//! Codec and container seams.
//!
//! The pipeline never touches a codec directly. It asks a [`MediaBackend`]
//! for decoders, encoders and a muxer, and talks to them through the traits
//! below. Decoders and encoders are callback-style: `decode`/`encode` only
//! enqueue work and output is delivered on the channel handed over at
//! creation. `flush` is the barrier: once it resolves, every output for the
//! input submitted so far has been sent.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use reelcut_common::error::ReelcutResult;
use reelcut_media_model::{DecodedAudioChunk, DecodedVideoFrame, DemuxedSource, Sample};

/// An encoded access unit produced by an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub is_key: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub description: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDecoderConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub description: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderConfig {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
}

/// Video track of the output container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxVideoTrack {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub description: Option<Bytes>,
}

/// Audio track of the output container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxAudioTrack {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Average bitrate advertised in the codec configuration, if any.
    pub bitrate: u32,
    pub description: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerConfig {
    pub video: MuxVideoTrack,
    pub audio: Option<MuxAudioTrack>,
}

/// Turns container bytes into sample tables.
pub trait Demuxer: Send {
    fn demux(&mut self, data: Bytes) -> ReelcutResult<DemuxedSource>;
}

#[async_trait]
pub trait VideoDecoder: Send {
    /// Enqueue one encoded sample.
    fn decode(&mut self, sample: &Sample) -> ReelcutResult<()>;

    /// Resolve once every frame for the submitted samples has been sent.
    async fn flush(&mut self) -> ReelcutResult<()>;

    /// Release the decoder. Further calls fail.
    fn close(&mut self);
}

#[async_trait]
pub trait VideoEncoder: Send {
    /// Enqueue one frame for encoding at `timestamp_us`.
    fn encode(
        &mut self,
        frame: &DecodedVideoFrame,
        timestamp_us: i64,
        key_frame: bool,
    ) -> ReelcutResult<()>;

    /// Resolve once every chunk for the submitted frames has been sent.
    async fn flush(&mut self) -> ReelcutResult<()>;

    /// Codec configuration record a decoder of the output will need.
    fn decoder_description(&self) -> Option<Bytes>;

    fn close(&mut self);
}

#[async_trait]
pub trait AudioDecoder: Send {
    fn decode(&mut self, sample: &Sample) -> ReelcutResult<()>;

    async fn flush(&mut self) -> ReelcutResult<()>;

    fn close(&mut self);
}

#[async_trait]
pub trait AudioEncoder: Send {
    /// Enqueue one chunk for encoding at `timestamp_us`.
    fn encode(&mut self, chunk: &DecodedAudioChunk, timestamp_us: i64) -> ReelcutResult<()>;

    async fn flush(&mut self) -> ReelcutResult<()>;

    fn decoder_description(&self) -> Option<Bytes>;

    fn close(&mut self);
}

/// Writes encoded chunks into an output container.
pub trait Muxer: Send {
    fn add_video_chunk(&mut self, chunk: &EncodedChunk) -> ReelcutResult<()>;

    fn add_audio_chunk(&mut self, chunk: &EncodedChunk) -> ReelcutResult<()>;

    /// Bytes of media data held so far.
    fn buffered_bytes(&self) -> u64;

    /// Serialize the finished container.
    fn finalize(self: Box<Self>) -> ReelcutResult<Bytes>;
}

/// Factory for every codec and container the pipeline uses.
///
/// Creation fails with `UnsupportedCodec` when a configuration names a codec
/// the backend cannot handle.
pub trait MediaBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    fn demuxer(&self) -> ReelcutResult<Box<dyn Demuxer>>;

    fn video_decoder(
        &self,
        config: &VideoDecoderConfig,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> ReelcutResult<Box<dyn VideoDecoder>>;

    fn video_encoder(
        &self,
        config: &VideoEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn VideoEncoder>>;

    fn audio_decoder(
        &self,
        config: &AudioDecoderConfig,
        output: mpsc::UnboundedSender<DecodedAudioChunk>,
    ) -> ReelcutResult<Box<dyn AudioDecoder>>;

    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn AudioEncoder>>;

    fn muxer(&self, config: &MuxerConfig) -> ReelcutResult<Box<dyn Muxer>>;
}
