use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use clipsqueeze::preview::parse_timestamp;

#[derive(Parser)]
#[command(name = "clipsqueeze")]
#[command(about = "Trim a clip and squeeze it into a target file size", long_about = None)]
pub struct Cli {
    /// Log engine activity at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Export settings shared by `plan` and `compress`
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Path to the video file
    pub file: PathBuf,

    /// Target output size in MiB (defaults to config, 10)
    #[arg(long, short)]
    pub size: Option<f64>,

    /// Output resolution: 480p, 720p or 1080p (defaults to the recommendation)
    #[arg(long, short)]
    pub resolution: Option<String>,

    /// Trim start (seconds, MM:SS.mmm or HH:MM:SS.mmm)
    #[arg(long, value_parser = parse_timestamp)]
    pub start: Option<f64>,

    /// Trim end (seconds, MM:SS.mmm or HH:MM:SS.mmm)
    #[arg(long, value_parser = parse_timestamp)]
    pub end: Option<f64>,

    /// Output folder (defaults to config, else the input's folder)
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Probe a video file and show the recommended resolution
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show the encode plan and ffmpeg commands without executing (dry run)
    Plan(ExportArgs),

    /// Trim (optionally) and re-encode a file into the target size
    Compress(ExportArgs),

    /// Interactive preview session for picking a trim window
    Session {
        /// Path to the video file
        file: PathBuf,
    },

    /// Create default config file
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
