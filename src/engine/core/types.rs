use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{EngineError, EngineResult};

/// External-process stages of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Extract,
    Pass1,
    Pass2,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Extract => "extract",
            PipelineStage::Pass1 => "pass1",
            PipelineStage::Pass2 => "pass2",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output resolution choices offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1080p")]
    P1080,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Resolution {
    /// Offer order, largest first. Never changes with the recommendation.
    pub const ALL: [Resolution; 3] = [Resolution::P1080, Resolution::P720, Resolution::P480];

    pub fn label(self) -> &'static str {
        match self {
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
            Resolution::P480 => "480p",
        }
    }

    /// Scale target (width, height) fed to `-vf scale=W:H`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::P1080 => (1920, 1080),
            Resolution::P720 => (1280, 720),
            Resolution::P480 => (854, 480),
        }
    }

    /// Parse a label such as `720p` or `480p (Recommended)`.
    pub fn from_label(label: &str) -> Option<Self> {
        let head = label.split_whitespace().next()?;
        Resolution::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(head))
    }

    /// Like `from_label`, but anything unrecognized becomes 720p.
    pub fn from_label_or_default(label: &str) -> Self {
        Self::from_label(label).unwrap_or_default()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Selected sub-range of the source, in seconds.
///
/// `end == None` means "to the end of the source".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: f64,
    pub end: Option<f64>,
}

impl TrimWindow {
    pub fn full() -> Self {
        Self::default()
    }

    /// Build a window, rejecting a negative start or an end at or before start.
    pub fn new(start: f64, end: Option<f64>) -> EngineResult<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(EngineError::InvalidTrim {
                start: self.start,
                end: self.end.unwrap_or(self.start),
            });
        }
        match self.end {
            Some(end) if !(end > self.start) => Err(EngineError::InvalidTrim {
                start: self.start,
                end,
            }),
            _ => Ok(()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.start > 0.0 || self.end.is_some()
    }

    /// True when the window cuts anything off a source of `duration` seconds.
    pub fn narrows(&self, duration: f64) -> bool {
        self.start > 0.0 || self.end.is_some_and(|end| end < duration)
    }

    /// Requested length against a source of `duration` seconds.
    pub fn length(&self, duration: f64) -> f64 {
        let end = self.end.map_or(duration, |e| e.min(duration));
        (end - self.start).max(0.0)
    }
}

/// Encoder knobs that stay fixed across exports (from config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub extra_args: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "slow".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
            extra_args: String::new(),
        }
    }
}

/// Immutable input to one pipeline run, captured when the user hits export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub trim: TrimWindow,
    pub target_size_mib: f64,
    pub resolution: Resolution,
    pub output_dir: PathBuf,
}

impl EncodeRequest {
    /// Request with the output folder defaulting to the source's own folder.
    pub fn new(source: impl Into<PathBuf>, target_size_mib: f64, resolution: Resolution) -> Self {
        let source = source.into();
        let output_dir = source
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            source,
            trim: TrimWindow::full(),
            target_size_mib,
            resolution,
            output_dir,
        }
    }

    pub fn with_trim(mut self, trim: TrimWindow) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Shared cancel switch for an in-flight export.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parser for ffmpeg `-progress -` output (key=value lines)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub total_size: Option<u64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of progress output. Unknown keys and `N/A` values are ignored.
    pub fn parse_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();
        match key.trim() {
            "out_time_us" => {
                if let Ok(us) = value.parse() {
                    self.out_time_us = us;
                }
            }
            "fps" => self.fps = value.parse().ok().or(self.fps),
            "speed" => self.speed = value.trim_end_matches('x').parse().ok().or(self.speed),
            "bitrate" => {
                self.bitrate_kbps = value
                    .trim_end_matches("kbits/s")
                    .parse()
                    .ok()
                    .or(self.bitrate_kbps)
            }
            "total_size" => self.total_size = value.parse().ok().or(self.total_size),
            "progress" => self.is_complete |= value == "end",
            _ => {}
        }
    }

    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Percentage of `duration_s` already written, capped at 100.
    pub fn progress_pct(&self, duration_s: f64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if duration_s > 0.0 {
            (self.out_time_s() / duration_s * 100.0).min(100.0)
        } else {
            0.0
        }
    }
}
