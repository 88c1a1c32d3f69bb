// User configuration: export defaults, encoder knobs, preview timing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::engine::{EncodeSettings, PipelineOptions, Resolution};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub encode: EncodeConfig,

    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Target output size in MiB
    #[serde(default = "default_target_size_mib")]
    pub target_size_mib: f64,

    /// Preselected resolution when the clip cannot be probed ("480p", "720p", "1080p")
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Output folder; unset means next to the input file
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,

    /// Extra ffmpeg arguments for pass 2, shell-quoted
    #[serde(default)]
    pub extra_args: String,

    /// Where pass-log files live during an export; unset means the working directory
    #[serde(default)]
    pub passlog_dir: Option<PathBuf>,

    /// Where extracted sub-ranges go; unset means the system temp directory
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_drag_debounce_ms")]
    pub drag_debounce_ms: u64,

    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

fn default_target_size_mib() -> f64 {
    10.0
}

fn default_resolution() -> String {
    "720p".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "slow".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate_kbps() -> u32 {
    128
}

fn default_tick_interval_ms() -> u64 {
    42
}

fn default_drag_debounce_ms() -> u64 {
    100
}

fn default_frame_width() -> u32 {
    480
}

fn default_frame_height() -> u32 {
    270
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_size_mib: default_target_size_mib(),
            resolution: default_resolution(),
            output_dir: None,
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            extra_args: String::new(),
            passlog_dir: None,
            temp_dir: None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            drag_debounce_ms: default_drag_debounce_ms(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("clipsqueeze");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Config::default();
        // Built-in defaults still work when the config dir is read-only
        if let Err(e) = config.save() {
            warn!(
                error = %format!("{e:#}"),
                "could not create default config file; run 'clipsqueeze init-config' to retry"
            );
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            Config::default().save()?;
        }
        Ok(())
    }

    pub fn default_resolution(&self) -> Resolution {
        Resolution::from_label_or_default(&self.defaults.resolution)
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            video_codec: self.encode.video_codec.clone(),
            preset: self.encode.preset.clone(),
            audio_codec: self.encode.audio_codec.clone(),
            audio_bitrate_kbps: self.encode.audio_bitrate_kbps,
            extra_args: self.encode.extra_args.clone(),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let fallback = PipelineOptions::default();
        PipelineOptions {
            settings: self.encode_settings(),
            passlog_dir: self.encode.passlog_dir.clone().unwrap_or(fallback.passlog_dir),
            temp_dir: self.encode.temp_dir.clone().unwrap_or(fallback.temp_dir),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.preview.tick_interval_ms.max(1))
    }

    pub fn drag_debounce(&self) -> Duration {
        Duration::from_millis(self.preview.drag_debounce_ms)
    }
}
