//! Show source information.

use std::path::PathBuf;

use reelcut_common::clock::PlaybackClock;
use reelcut_render_engine::bundle::load_source;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let source = load_source(&path).map_err(|e| anyhow::anyhow!("Failed to load source: {e}"))?;

    println!("Source: {}", source.name);
    println!(
        "  Duration: {:.3}s",
        PlaybackClock::us_to_secs(source.duration_us)
    );
    println!();

    match &source.video {
        Some(video) => {
            println!("Video:");
            println!("  Codec: {}", video.info.codec);
            println!("  Size: {}x{}", video.info.width, video.info.height);
            println!("  Samples: {}", video.samples.len());
            println!("  Keyframes: {}", video.keyframes.len());
            println!("  Ends at: {:.3}s", PlaybackClock::us_to_secs(video.end_us()));
        }
        None => println!("Video: none"),
    }
    println!();

    match &source.audio {
        Some(audio) => {
            println!("Audio:");
            println!("  Codec: {}", audio.info.codec);
            println!(
                "  Format: {} Hz, {} ch",
                audio.info.sample_rate, audio.info.channel_count
            );
            println!("  Samples: {}", audio.samples.len());
            println!("  Ends at: {:.3}s", PlaybackClock::us_to_secs(audio.end_us()));
        }
        None => println!("Audio: none"),
    }

    Ok(())
}
