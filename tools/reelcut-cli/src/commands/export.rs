//! Export a trimmed range of a source to MP4.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reelcut_common::clock::PlaybackClock;
use reelcut_common::config::AppConfig;
use reelcut_media_model::ExportConfig;
use reelcut_render_engine::bundle::load_source;
use reelcut_render_engine::{
    spawn_export_worker, BuiltinBackend, ExportRequest, ExportResponse, ExportSettings,
    SourceInput,
};

pub struct ExportArgs {
    pub source: PathBuf,
    pub in_secs: f64,
    pub out_secs: f64,
    pub output: Option<PathBuf>,
    pub video_bitrate: Option<u32>,
    pub audio_bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
}

pub async fn run(app_config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    println!("Exporting: {}", args.source.display());

    let source =
        load_source(&args.source).map_err(|e| anyhow::anyhow!("Failed to load source: {e}"))?;

    let defaults = &app_config.export;
    let mut config = ExportConfig::from_defaults(
        defaults,
        source.name.clone(),
        PlaybackClock::secs_to_us(args.in_secs),
        PlaybackClock::secs_to_us(args.out_secs),
    );
    if let Some(bitrate) = args.video_bitrate {
        config.video_bitrate = bitrate;
    }
    if let Some(bitrate) = args.audio_bitrate {
        config.audio_bitrate = bitrate;
    }
    if let Some(rate) = args.sample_rate {
        config.audio_sample_rate = rate;
    }
    config.validate()?;

    println!("  Range: {:.3}s - {:.3}s", args.in_secs, args.out_secs);
    println!("  Video: {} @ {} bps", config.video_codec, config.video_bitrate);
    println!(
        "  Audio: {} @ {} Hz, {} bps",
        config.audio_codec, config.audio_sample_rate, config.audio_bitrate
    );

    let mut worker = spawn_export_worker(Arc::new(BuiltinBackend), ExportSettings::from(defaults));
    worker.start(ExportRequest {
        source: SourceInput::Demuxed(source),
        config,
    })?;

    let mut abort_sent = false;
    loop {
        let response = tokio::select! {
            response = worker.recv() => response,
            _ = tokio::signal::ctrl_c(), if !abort_sent => {
                println!("\n  Aborting...");
                worker.abort()?;
                abort_sent = true;
                continue;
            }
        };

        match response {
            Some(ExportResponse::Started {
                estimated_frames,
                has_audio,
            }) => {
                println!(
                    "  Frames: {estimated_frames}{}",
                    if has_audio { " (with audio)" } else { "" }
                );
            }
            Some(ExportResponse::Progress(p)) => {
                let eta = p
                    .estimated_remaining_ms
                    .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
                    .unwrap_or_else(|| "-".to_string());
                print!(
                    "\r  Progress: {:.1}% ({:?}, ETA: {eta})  ",
                    p.overall_progress_pct, p.stage
                );
                std::io::stdout().flush().ok();
            }
            Some(ExportResponse::Complete {
                container_bytes,
                filename,
                duration_ms,
            }) => {
                let output_path = match &args.output {
                    Some(path) if path.is_dir() => path.join(&filename),
                    Some(path) => path.clone(),
                    None => defaults.output_dir.join(&filename),
                };
                if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&output_path, &container_bytes)?;
                println!(
                    "\nExport complete: {} ({:.1}s, {} bytes)",
                    output_path.display(),
                    duration_ms as f64 / 1000.0,
                    container_bytes.len()
                );
                break;
            }
            Some(ExportResponse::Error {
                message,
                recoverable,
            }) => {
                if recoverable {
                    return Err(anyhow::anyhow!("Export failed: {message} (retrying may help)"));
                }
                return Err(anyhow::anyhow!("Export failed: {message}"));
            }
            Some(ExportResponse::Aborted) => {
                println!("\nExport aborted");
                break;
            }
            None => return Err(anyhow::anyhow!("Export worker stopped unexpectedly")),
        }
    }

    worker.shutdown().await;
    Ok(())
}
