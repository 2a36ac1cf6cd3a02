//! Trim-and-transcode export pipeline.
//!
//! One run takes a source and an `[in, out)` range and produces a finished
//! MP4 in memory:
//!
//! ```text
//! source ──► demux ──► range filter ──► video decode ──► drop < in ──► video encode ──┐
//!                           │                                                        ├──► mux ──► MP4
//!                           └─────────► audio decode ──► drop < in ──► audio encode ──┘
//! ```
//!
//! Every run gets a fresh [`ExportContext`]; nothing is shared between runs.
//! Cancellation is polled between batches, and codecs are closed however
//! the run ends.

use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use reelcut_common::clock::PlaybackClock;
use reelcut_common::config::ExportDefaults;
use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::{
    AudioSampleTrack, DemuxedSource, ExportConfig, ExportProgress, ExportStage, VideoSampleTrack,
};

use crate::backend::{
    AudioDecoderConfig, AudioEncoderConfig, EncodedChunk, MediaBackend, MuxAudioTrack,
    MuxVideoTrack, Muxer, MuxerConfig, VideoDecoderConfig, VideoEncoderConfig,
};
use crate::progress::ProgressTracker;
use crate::range::{select_audio_samples, select_video_samples, VideoSelection};

const BYTES_PER_DECODED_PIXEL: u64 = 4;

/// Where the source media comes from.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Sample tables produced by an external demuxer.
    Demuxed(DemuxedSource),
    /// Container bytes for the backend's demuxer.
    Bytes(Bytes),
}

/// Everything needed to start one export.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: SourceInput,
    pub config: ExportConfig,
}

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    /// Emit progress after this many encoded frames or chunks.
    pub progress_interval_frames: usize,

    /// Poll for cancellation after this many submitted samples.
    pub decode_batch_size: usize,

    /// Refuse exports whose decoded frames or container exceed this.
    pub memory_limit_bytes: u64,
}

impl From<&ExportDefaults> for ExportSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            progress_interval_frames: defaults.progress_interval_frames.max(1),
            decode_batch_size: defaults.decode_batch_size.max(1),
            memory_limit_bytes: defaults.memory_limit_bytes,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub container_bytes: Bytes,
    pub filename: String,
    /// Wall-clock time the export took, demux to finalize.
    pub duration_ms: u64,
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Complete(ExportArtifact),
    Aborted,
}

/// Notifications emitted while a run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Started {
        estimated_frames: usize,
        has_audio: bool,
    },
    Progress(ExportProgress),
}

/// Run one export to completion, abort or failure.
pub async fn run_export(
    backend: &dyn MediaBackend,
    request: ExportRequest,
    settings: &ExportSettings,
    cancel: &CancellationToken,
    on_event: &(dyn Fn(ExportEvent) + Send + Sync),
) -> ReelcutResult<ExportOutcome> {
    ExportContext::new(backend, settings, cancel, on_event)
        .run(request)
        .await
}

/// Closes a codec when dropped.
struct CodecHandle<T> {
    inner: T,
    close: fn(&mut T),
}

impl<T> CodecHandle<T> {
    fn new(inner: T, close: fn(&mut T)) -> Self {
        Self { inner, close }
    }
}

impl<T> Deref for CodecHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for CodecHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for CodecHandle<T> {
    fn drop(&mut self) {
        (self.close)(&mut self.inner);
    }
}

/// Encoded output waiting to be muxed.
type ChunkReceiver = mpsc::UnboundedReceiver<EncodedChunk>;

/// State of a single export run.
pub struct ExportContext<'a> {
    backend: &'a dyn MediaBackend,
    settings: &'a ExportSettings,
    cancel: &'a CancellationToken,
    on_event: &'a (dyn Fn(ExportEvent) + Send + Sync),
    stage: ExportStage,
    tracker: ProgressTracker,
    clock: PlaybackClock,
}

impl<'a> ExportContext<'a> {
    pub fn new(
        backend: &'a dyn MediaBackend,
        settings: &'a ExportSettings,
        cancel: &'a CancellationToken,
        on_event: &'a (dyn Fn(ExportEvent) + Send + Sync),
    ) -> Self {
        Self {
            backend,
            settings,
            cancel,
            on_event,
            stage: ExportStage::Idle,
            tracker: ProgressTracker::new(settings.progress_interval_frames, 0, None),
            clock: PlaybackClock::start(),
        }
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    /// Consume the context and run the export.
    pub async fn run(mut self, request: ExportRequest) -> ReelcutResult<ExportOutcome> {
        let result = self.execute(request).await;
        match &result {
            Ok(ExportOutcome::Complete(artifact)) => {
                self.enter(ExportStage::Complete);
                tracing::info!(
                    filename = %artifact.filename,
                    bytes = artifact.container_bytes.len(),
                    duration_ms = artifact.duration_ms,
                    "Export complete"
                );
            }
            Ok(ExportOutcome::Aborted) => {
                self.enter(ExportStage::Aborted);
                tracing::info!("Export aborted");
            }
            Err(e) => {
                self.enter(ExportStage::Error);
                tracing::warn!(error = %e, recoverable = e.is_recoverable(), "Export failed");
            }
        }
        result
    }

    fn enter(&mut self, stage: ExportStage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "Export stage");
        self.stage = stage;
    }

    fn emit(&self, event: ExportEvent) {
        (self.on_event)(event);
    }

    fn emit_progress(&self) {
        self.emit(ExportEvent::Progress(self.tracker.report(self.stage)));
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn execute(&mut self, request: ExportRequest) -> ReelcutResult<ExportOutcome> {
        self.clock = PlaybackClock::start();
        let config = request.config;
        config.validate()?;

        self.enter(ExportStage::Demuxing);
        let source = match request.source {
            SourceInput::Demuxed(source) => source,
            SourceInput::Bytes(data) => self.backend.demuxer()?.demux(data)?,
        };
        if self.cancelled() {
            return Ok(ExportOutcome::Aborted);
        }

        let no_frames = || ReelcutError::NoFramesInRange {
            in_point_us: config.in_point_us,
            out_point_us: config.out_point_us,
        };
        let video = source.video.as_ref().ok_or_else(no_frames)?;
        let selection = select_video_samples(
            &video.samples,
            video.keyframes.as_slice(),
            config.in_point_us,
            config.out_point_us,
        )
        .ok_or_else(no_frames)?;

        let audio = source.audio.as_ref().and_then(|track| {
            let range = select_audio_samples(&track.samples, config.in_point_us, config.out_point_us);
            (!range.is_empty()).then_some((track, range))
        });
        let has_audio = audio.is_some();

        let frame_bytes =
            video.info.width as u64 * video.info.height as u64 * BYTES_PER_DECODED_PIXEL;
        let decoded_estimate = frame_bytes.saturating_mul(selection.decode.len() as u64);
        if decoded_estimate > self.settings.memory_limit_bytes {
            return Err(ReelcutError::resource_exhausted(format!(
                "decoding {} frames needs ~{decoded_estimate} bytes, limit is {}",
                selection.decode.len(),
                self.settings.memory_limit_bytes
            )));
        }

        tracing::info!(
            source = %source.name,
            in_point_us = config.in_point_us,
            out_point_us = config.out_point_us,
            frames = selection.in_range_count,
            preroll = selection.preroll_count(),
            has_audio,
            "Starting export"
        );
        self.tracker = ProgressTracker::new(
            self.settings.progress_interval_frames,
            selection.in_range_count,
            audio.as_ref().map(|(_, range)| range.len()),
        );
        self.emit(ExportEvent::Started {
            estimated_frames: selection.in_range_count,
            has_audio,
        });

        // Encoders first: the muxer needs their decoder descriptions.
        let (video_chunk_tx, mut video_chunks) = mpsc::unbounded_channel();
        let mut video_encoder = CodecHandle::new(
            self.backend.video_encoder(
                &VideoEncoderConfig {
                    codec: config.video_codec.clone(),
                    width: video.info.width,
                    height: video.info.height,
                    bitrate: config.video_bitrate,
                },
                video_chunk_tx,
            )?,
            |c| c.close(),
        );

        let audio_channels = audio
            .as_ref()
            .map(|(track, _)| config.audio_channels.unwrap_or(track.info.channel_count));
        let (audio_chunk_tx, mut audio_chunks) = mpsc::unbounded_channel();
        let mut audio_encoder = match audio_channels {
            Some(channel_count) => Some(CodecHandle::new(
                self.backend.audio_encoder(
                    &AudioEncoderConfig {
                        codec: config.audio_codec.clone(),
                        sample_rate: config.audio_sample_rate,
                        channel_count,
                        bitrate: config.audio_bitrate,
                    },
                    audio_chunk_tx,
                )?,
                |c| c.close(),
            )),
            None => None,
        };

        let mut muxer = self.backend.muxer(&MuxerConfig {
            video: MuxVideoTrack {
                codec: config.video_codec.clone(),
                width: video.info.width,
                height: video.info.height,
                description: video_encoder.decoder_description(),
            },
            audio: match (&audio_encoder, audio_channels) {
                (Some(encoder), Some(channel_count)) => Some(MuxAudioTrack {
                    codec: config.audio_codec.clone(),
                    sample_rate: config.audio_sample_rate,
                    channel_count,
                    bitrate: config.audio_bitrate,
                    description: encoder.decoder_description(),
                }),
                _ => None,
            },
        })?;

        self.enter(ExportStage::EncodingVideo);
        self.emit_progress();
        let video_done = self
            .transcode_video(
                video,
                &selection,
                &config,
                &mut video_encoder,
                &mut video_chunks,
                muxer.as_mut(),
            )
            .await?;
        if !video_done {
            return Ok(ExportOutcome::Aborted);
        }

        if let (Some((track, range)), Some(encoder)) = (&audio, audio_encoder.as_mut()) {
            self.enter(ExportStage::EncodingAudio);
            self.emit_progress();
            let audio_done = self
                .transcode_audio(
                    track,
                    range.clone(),
                    &config,
                    encoder,
                    &mut audio_chunks,
                    muxer.as_mut(),
                )
                .await?;
            if !audio_done {
                return Ok(ExportOutcome::Aborted);
            }
        }

        if self.cancelled() {
            return Ok(ExportOutcome::Aborted);
        }
        self.enter(ExportStage::Finalizing);
        self.emit_progress();

        let container_bytes = muxer.finalize()?;
        if container_bytes.len() as u64 > self.settings.memory_limit_bytes {
            return Err(ReelcutError::resource_exhausted(format!(
                "container of {} bytes exceeds limit of {}",
                container_bytes.len(),
                self.settings.memory_limit_bytes
            )));
        }

        Ok(ExportOutcome::Complete(ExportArtifact {
            container_bytes,
            filename: config.output_filename(&chrono::Local::now()),
            duration_ms: self.clock.elapsed_ms(),
        }))
    }

    /// Decode the selection, drop pre-roll, encode and mux the rest.
    /// Returns `false` if the run was cancelled.
    async fn transcode_video(
        &mut self,
        track: &VideoSampleTrack,
        selection: &VideoSelection,
        config: &ExportConfig,
        encoder: &mut CodecHandle<Box<dyn crate::backend::VideoEncoder>>,
        chunks: &mut ChunkReceiver,
        muxer: &mut dyn Muxer,
    ) -> ReelcutResult<bool> {
        let batch = self.settings.decode_batch_size.max(1);
        let (frame_tx, mut frames_rx) = mpsc::unbounded_channel();
        let mut decoder = CodecHandle::new(
            self.backend.video_decoder(
                &VideoDecoderConfig {
                    codec: track.info.codec.clone(),
                    coded_width: track.info.width,
                    coded_height: track.info.height,
                    description: track.info.description.clone(),
                },
                frame_tx,
            )?,
            |c| c.close(),
        );

        for (n, sample) in track.samples[selection.decode.clone()].iter().enumerate() {
            decoder.decode(sample)?;
            if (n + 1) % batch == 0 {
                if self.cancelled() {
                    return Ok(false);
                }
                tokio::task::yield_now().await;
            }
        }
        decoder.flush().await?;
        if self.cancelled() {
            return Ok(false);
        }

        let mut frames = Vec::with_capacity(selection.decode.len());
        while let Ok(frame) = frames_rx.try_recv() {
            if frame.timestamp_us() < config.in_point_us
                || frame.timestamp_us() >= config.out_point_us
            {
                frame.close();
            } else {
                frames.push(frame);
            }
        }
        frames.sort_by_key(|f| f.timestamp_us());
        drop(decoder);

        let Some(base_us) = frames.first().map(|f| f.timestamp_us()) else {
            return Err(ReelcutError::NoFramesInRange {
                in_point_us: config.in_point_us,
                out_point_us: config.out_point_us,
            });
        };
        self.tracker.set_video_total(frames.len());

        for (n, frame) in frames.into_iter().enumerate() {
            encoder.encode(&frame, frame.timestamp_us() - base_us, n == 0)?;
            frame.close();

            if self.tracker.video_encoded() {
                self.emit_progress();
            }
            if (n + 1) % batch == 0 {
                self.mux_pending(chunks, muxer, false)?;
                if self.cancelled() {
                    return Ok(false);
                }
                tokio::task::yield_now().await;
            }
        }

        encoder.flush().await?;
        self.mux_pending(chunks, muxer, false)?;
        tracing::debug!(frames = self.tracker.video_done(), "Video encoded");
        Ok(!self.cancelled())
    }

    /// Decode the audio range, shift it to start at zero, encode and mux.
    /// Returns `false` if the run was cancelled.
    async fn transcode_audio(
        &mut self,
        track: &AudioSampleTrack,
        range: std::ops::Range<usize>,
        config: &ExportConfig,
        encoder: &mut CodecHandle<Box<dyn crate::backend::AudioEncoder>>,
        chunks: &mut ChunkReceiver,
        muxer: &mut dyn Muxer,
    ) -> ReelcutResult<bool> {
        let batch = self.settings.decode_batch_size.max(1);
        let (chunk_tx, mut decoded_rx) = mpsc::unbounded_channel();
        let mut decoder = CodecHandle::new(
            self.backend.audio_decoder(
                &AudioDecoderConfig {
                    codec: track.info.codec.clone(),
                    sample_rate: track.info.sample_rate,
                    channel_count: track.info.channel_count,
                    description: track.info.description.clone(),
                },
                chunk_tx,
            )?,
            |c| c.close(),
        );

        for (n, sample) in track.samples[range].iter().enumerate() {
            decoder.decode(sample)?;
            if (n + 1) % batch == 0 {
                if self.cancelled() {
                    return Ok(false);
                }
                tokio::task::yield_now().await;
            }
        }
        decoder.flush().await?;
        if self.cancelled() {
            return Ok(false);
        }

        let mut decoded = Vec::new();
        while let Ok(chunk) = decoded_rx.try_recv() {
            if chunk.timestamp_us >= config.in_point_us {
                decoded.push(chunk);
            }
        }
        drop(decoder);
        self.tracker.set_audio_total(decoded.len());

        for (n, chunk) in decoded.iter().enumerate() {
            encoder.encode(chunk, chunk.timestamp_us - config.in_point_us)?;
            if self.tracker.audio_encoded() {
                self.emit_progress();
            }
            if (n + 1) % batch == 0 {
                self.mux_pending(chunks, muxer, true)?;
                if self.cancelled() {
                    return Ok(false);
                }
                tokio::task::yield_now().await;
            }
        }

        encoder.flush().await?;
        self.mux_pending(chunks, muxer, true)?;
        Ok(!self.cancelled())
    }

    /// Move every chunk the encoder has produced so far into the muxer.
    fn mux_pending(
        &mut self,
        chunks: &mut ChunkReceiver,
        muxer: &mut dyn Muxer,
        audio: bool,
    ) -> ReelcutResult<()> {
        while let Ok(mut chunk) = chunks.try_recv() {
            if audio {
                // Audio frames decode independently.
                chunk.is_key = true;
                muxer.add_audio_chunk(&chunk)?;
            } else {
                muxer.add_video_chunk(&chunk)?;
            }
        }
        if muxer.buffered_bytes() > self.settings.memory_limit_bytes {
            return Err(ReelcutError::resource_exhausted(format!(
                "muxed media of {} bytes exceeds limit of {}",
                muxer.buffered_bytes(),
                self.settings.memory_limit_bytes
            )));
        }
        Ok(())
    }
}
