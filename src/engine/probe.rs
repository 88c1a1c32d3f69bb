// Source probing: duration, frame rate and frame count via ffprobe

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::core::{EngineError, EngineResult};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mkv", "mov", "avi", "webm", "mpg", "mpeg", "ts"];

/// Probed facts about one input file. Re-probed on every load or extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub path: PathBuf,
    pub duration: f64,
    /// 0.0 when the container does not report a usable rate.
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl MediaSource {
    /// Seconds per frame, if the frame rate is known.
    pub fn frame_interval(&self) -> Option<f64> {
        (self.fps > 0.0).then(|| 1.0 / self.fps)
    }
}

/// Duration lookups used by the pipeline. Swappable so tests can avoid ffprobe.
pub trait Prober: Send + Sync {
    fn probe_duration(&self, path: &Path) -> EngineResult<f64>;
}

/// `Prober` backed by the ffprobe binary on PATH.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProber;

impl Prober for FfprobeProber {
    fn probe_duration(&self, path: &Path) -> EngineResult<f64> {
        super::core::probe_duration(path)
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Probe input file using ffprobe for duration and first video stream details
pub fn probe_media_source(path: &Path) -> EngineResult<MediaSource> {
    if !is_video_file(path) {
        return Err(EngineError::probe(path, "not a recognized video file"));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0", // First video stream only
        ])
        .arg(path)
        .output()
        .map_err(|e| EngineError::probe(path, format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::probe(
            path,
            format!("ffprobe exited with {}", output.status),
        ));
    }

    let source = parse_media_source(path, &String::from_utf8_lossy(&output.stdout))?;
    debug!(
        path = %path.display(),
        duration = source.duration,
        fps = source.fps,
        frames = source.frame_count,
        "probed media source"
    );
    Ok(source)
}

/// Build a `MediaSource` from ffprobe's JSON (`-show_format -show_streams`).
pub fn parse_media_source(path: &Path, json: &str) -> EngineResult<MediaSource> {
    let json: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| EngineError::probe(path, format!("unparsable ffprobe JSON: {e}")))?;

    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| EngineError::probe(path, "no numeric duration reported"))?;

    let stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or_else(|| EngineError::probe(path, "no video stream found"))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;

    // r_frame_rate first, avg_frame_rate as fallback; "0/0" means unknown
    let fps = ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| stream[*key].as_str().and_then(parse_fraction))
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0);

    let frame_count = stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    Ok(MediaSource {
        path: path.to_path_buf(),
        duration,
        fps,
        frame_count,
        width,
        height,
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (numerator, denominator) = s.split_once('/')?;
    let numerator: f64 = numerator.trim().parse().ok()?;
    let denominator: f64 = denominator.trim().parse().ok()?;

    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
