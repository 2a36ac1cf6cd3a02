//! Reelcut CLI: inspect, bundle and export sources from the command line.
//!
//! Usage:
//!   reelcut info <SOURCE>                        Show tracks and sample tables
//!   reelcut bundle <MANIFEST> -o <FILE>          Pack a manifest into a bundle
//!   reelcut export <SOURCE> --in <S> --out <S>   Export a trimmed MP4

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reelcut_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelcut",
    about = "Trim and transcode clips from demuxed sources",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tracks, sample counts and keyframes of a source
    Info {
        /// Manifest (.json) or sample bundle
        source: PathBuf,
    },

    /// Pack a manifest and its payload into a single bundle file
    Bundle {
        /// Manifest (.json)
        manifest: PathBuf,

        /// Bundle file to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Export [in, out) of a source to MP4
    Export {
        /// Manifest (.json) or sample bundle
        source: PathBuf,

        /// Range start (seconds)
        #[arg(long = "in")]
        in_secs: f64,

        /// Range end (seconds, exclusive)
        #[arg(long = "out")]
        out_secs: f64,

        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Video bitrate (bits per second)
        #[arg(long)]
        video_bitrate: Option<u32>,

        /// Audio bitrate (bits per second)
        #[arg(long)]
        audio_bitrate: Option<u32>,

        /// Output audio sample rate
        #[arg(long)]
        sample_rate: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelcut_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Info { source } => commands::info::run(source),
        Commands::Bundle { manifest, output } => commands::bundle::run(manifest, output),
        Commands::Export {
            source,
            in_secs,
            out_secs,
            output,
            video_bitrate,
            audio_bitrate,
            sample_rate,
        } => {
            commands::export::run(
                &app_config,
                commands::export::ExportArgs {
                    source,
                    in_secs,
                    out_secs,
                    output,
                    video_bitrate,
                    audio_bitrate,
                    sample_rate,
                },
            )
            .await
        }
    }
}
