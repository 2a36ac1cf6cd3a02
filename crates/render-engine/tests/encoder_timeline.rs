//! What the encoders actually receive during an export, observed through a
//! backend that wraps the builtin codecs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use reelcut_common::config::ExportDefaults;
use reelcut_common::error::ReelcutResult;
use reelcut_media_model::{
    AudioTrackInfo, DecodedAudioChunk, DecodedVideoFrame, DemuxedSource, ExportConfig, Sample,
    SampleTrack, VideoTrackInfo,
};
use reelcut_render_engine::backend::{
    AudioDecoder, AudioDecoderConfig, AudioEncoder, AudioEncoderConfig, Demuxer, EncodedChunk,
    MediaBackend, Muxer, MuxerConfig, VideoDecoder, VideoDecoderConfig, VideoEncoder,
    VideoEncoderConfig,
};
use reelcut_render_engine::range::select_video_samples;
use reelcut_render_engine::raw::pcm_f32_payload;
use reelcut_render_engine::{
    run_export, BuiltinBackend, ExportEvent, ExportOutcome, ExportRequest, ExportSettings,
    SourceInput,
};

/// 1x1 raw video at 10 fps with a keyframe every 5 frames, plus 100 ms mono
/// PCM chunks at 1 kHz.
fn source(frames: i64) -> DemuxedSource {
    DemuxedSource {
        name: "harbour.mp4".to_string(),
        duration_us: frames * 100_000,
        video: Some(SampleTrack::new(
            VideoTrackInfo {
                codec: "raw".to_string(),
                width: 1,
                height: 1,
                description: None,
            },
            (0..frames)
                .map(|i| Sample::new(i * 100, 100, 1_000, i % 5 == 0, Bytes::from(vec![0u8; 4])))
                .collect(),
        )),
        audio: Some(SampleTrack::new(
            AudioTrackInfo {
                codec: "pcm-f32".to_string(),
                sample_rate: 1_000,
                channel_count: 1,
                description: None,
            },
            (0..frames)
                .map(|i| Sample::new(i * 100, 100, 1_000, true, pcm_f32_payload(&[0.25; 100])))
                .collect(),
        )),
    }
}

fn request(source: DemuxedSource, in_us: i64, out_us: i64) -> ExportRequest {
    let mut config =
        ExportConfig::from_defaults(&ExportDefaults::default(), &source.name, in_us, out_us);
    config.audio_sample_rate = 1_000;
    ExportRequest {
        source: SourceInput::Demuxed(source),
        config,
    }
}

async fn export(backend: &dyn MediaBackend, request: ExportRequest) -> ExportOutcome {
    run_export(
        backend,
        request,
        &ExportSettings::default(),
        &CancellationToken::new(),
        &|_: ExportEvent| {},
    )
    .await
    .unwrap()
}

type Log<T> = Arc<Mutex<Vec<T>>>;

struct RecordingVideoEncoder {
    inner: Box<dyn VideoEncoder>,
    log: Log<(i64, bool)>,
}

#[async_trait]
impl VideoEncoder for RecordingVideoEncoder {
    fn encode(
        &mut self,
        frame: &DecodedVideoFrame,
        timestamp_us: i64,
        key_frame: bool,
    ) -> ReelcutResult<()> {
        self.log.lock().unwrap().push((timestamp_us, key_frame));
        self.inner.encode(frame, timestamp_us, key_frame)
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        self.inner.flush().await
    }

    fn decoder_description(&self) -> Option<Bytes> {
        self.inner.decoder_description()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

struct RecordingAudioEncoder {
    inner: Box<dyn AudioEncoder>,
    log: Log<i64>,
}

#[async_trait]
impl AudioEncoder for RecordingAudioEncoder {
    fn encode(&mut self, chunk: &DecodedAudioChunk, timestamp_us: i64) -> ReelcutResult<()> {
        self.log.lock().unwrap().push(timestamp_us);
        self.inner.encode(chunk, timestamp_us)
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        self.inner.flush().await
    }

    fn decoder_description(&self) -> Option<Bytes> {
        self.inner.decoder_description()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Video decoder whose flush takes `delay` before completing.
struct SlowFlushDecoder {
    inner: Box<dyn VideoDecoder>,
    delay: Duration,
}

#[async_trait]
impl VideoDecoder for SlowFlushDecoder {
    fn decode(&mut self, sample: &Sample) -> ReelcutResult<()> {
        self.inner.decode(sample)
    }

    async fn flush(&mut self) -> ReelcutResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.flush().await
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Builtin codecs with recorded encoder input and an optional slow video
/// decoder flush.
#[derive(Default)]
struct RecordingBackend {
    video: Log<(i64, bool)>,
    audio: Log<i64>,
    flush_delay: Option<Duration>,
}

impl MediaBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn demuxer(&self) -> ReelcutResult<Box<dyn Demuxer>> {
        BuiltinBackend.demuxer()
    }

    fn video_decoder(
        &self,
        config: &VideoDecoderConfig,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> ReelcutResult<Box<dyn VideoDecoder>> {
        let inner = BuiltinBackend.video_decoder(config, output)?;
        Ok(match self.flush_delay {
            Some(delay) => Box::new(SlowFlushDecoder { inner, delay }),
            None => inner,
        })
    }

    fn video_encoder(
        &self,
        config: &VideoEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(RecordingVideoEncoder {
            inner: BuiltinBackend.video_encoder(config, output)?,
            log: self.video.clone(),
        }))
    }

    fn audio_decoder(
        &self,
        config: &AudioDecoderConfig,
        output: mpsc::UnboundedSender<DecodedAudioChunk>,
    ) -> ReelcutResult<Box<dyn AudioDecoder>> {
        BuiltinBackend.audio_decoder(config, output)
    }

    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
        output: mpsc::UnboundedSender<EncodedChunk>,
    ) -> ReelcutResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(RecordingAudioEncoder {
            inner: BuiltinBackend.audio_encoder(config, output)?,
            log: self.audio.clone(),
        }))
    }

    fn muxer(&self, config: &MuxerConfig) -> ReelcutResult<Box<dyn Muxer>> {
        BuiltinBackend.muxer(config)
    }
}

#[tokio::test]
async fn test_preroll_frames_never_reach_the_encoder() {
    let media = source(20);
    let track = media.video.as_ref().unwrap();
    let selection =
        select_video_samples(&track.samples, track.keyframes.as_slice(), 700_000, 1_200_000)
            .unwrap();
    // Decoding starts at the keyframe at 0.5s.
    assert_eq!(selection.preroll_count(), 2);

    let backend = RecordingBackend::default();
    let outcome = export(&backend, request(media, 700_000, 1_200_000)).await;
    assert!(matches!(outcome, ExportOutcome::Complete(_)));

    let video = backend.video.lock().unwrap().clone();
    assert_eq!(
        video,
        vec![
            (0, true),
            (100_000, false),
            (200_000, false),
            (300_000, false),
            (400_000, false),
        ]
    );
    assert_eq!(video.len(), selection.in_range_count);

    // Audio is shifted by the in point, so it starts at zero too.
    let audio = backend.audio.lock().unwrap().clone();
    assert_eq!(audio, vec![0, 100_000, 200_000, 300_000, 400_000]);
}

#[tokio::test]
async fn test_reported_duration_is_wall_clock() {
    let backend = RecordingBackend {
        flush_delay: Some(Duration::from_millis(400)),
        ..RecordingBackend::default()
    };
    // 100 ms of media; the export itself takes at least the flush delay.
    let ExportOutcome::Complete(artifact) = export(&backend, request(source(10), 0, 100_000)).await
    else {
        panic!("expected a complete export");
    };
    assert!(artifact.duration_ms >= 400, "took {}ms", artifact.duration_ms);
}
