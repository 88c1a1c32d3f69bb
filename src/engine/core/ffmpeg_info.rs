use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::error::{EngineError, EngineResult};

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

fn tool_version(tool: &str) -> Result<String> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {tool}. Is {tool} installed and in PATH?"))?;

    if !output.status.success() {
        anyhow::bail!("{tool} command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");
    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version() -> Result<String> {
    tool_version("ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version() -> Result<String> {
    tool_version("ffprobe")
}

/// Probe a media file for its container duration in seconds.
///
/// Can take a few seconds on large files; keep it off the tick loop.
pub fn probe_duration(path: &Path) -> EngineResult<f64> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| EngineError::probe(path, format!("failed to execute ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::probe(
            path,
            format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let duration = parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
        .map_err(|e| EngineError::probe(path, format!("{e:#}")))?;
    debug!(path = %path.display(), duration, "probed duration");
    Ok(duration)
}

/// Parse `format.duration` out of ffprobe JSON
pub fn parse_ffprobe_duration(json: &str) -> Result<f64> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON")?;

    let duration_str = probe.format.duration.context("No duration found in JSON")?;

    let duration = duration_str
        .trim()
        .parse::<f64>()
        .with_context(|| format!("Duration {duration_str:?} is not a number"))?;
    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("Duration {duration} is out of range");
    }
    Ok(duration)
}
