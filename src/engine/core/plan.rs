use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::bitrate::{plan_video_bitrate, plan_with_margin};
use super::error::{EngineError, EngineResult};
use super::types::EncodeRequest;

const OUTPUT_SUFFIX: &str = " - (Processed)";

/// Pass-log files written by pass 1 and read by pass 2.
///
/// With `-passlogfile <prefix>` libx264 writes `<prefix>-0.log` and
/// `<prefix>-0.log.mbtree`, first as `.temp` files that are renamed only
/// when pass 1 closes cleanly. A killed pass 1 leaves the `.temp` pair behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassLogSet {
    prefix: PathBuf,
}

impl PassLogSet {
    pub const DEFAULT_BASENAME: &'static str = "ffmpeg2pass";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            prefix: dir.join(Self::DEFAULT_BASENAME),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn files(&self) -> [PathBuf; 4] {
        let base = self.prefix.as_os_str().to_string_lossy();
        [
            PathBuf::from(format!("{base}-0.log")),
            PathBuf::from(format!("{base}-0.log.mbtree")),
            PathBuf::from(format!("{base}-0.log.temp")),
            PathBuf::from(format!("{base}-0.log.mbtree.temp")),
        ]
    }

    /// Delete whichever pass-log files exist. Safe to call repeatedly.
    pub fn remove_all(&self) {
        for file in self.files() {
            match fs::remove_file(&file) {
                Ok(()) => debug!(path = %file.display(), "removed pass log"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %file.display(), error = %e, "failed to remove pass log"),
            }
        }
    }
}

/// `<stem> - (Processed)<.ext>` inside `output_dir`.
pub fn derive_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let file_name = match input.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    output_dir.join(file_name)
}

/// Everything the two passes need, fixed once per export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodePlan {
    /// File actually fed to the encoder (the extracted sub-range when trimming).
    pub effective_source: PathBuf,
    pub effective_duration_s: f64,
    /// Planner output before the safety margin.
    pub nominal_video_kbps: f64,
    /// Bitrate passed as `-b:v`, after the margin, truncated to whole kbps.
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub width: u32,
    pub height: u32,
    pub output_path: PathBuf,
    pub temp_source: Option<PathBuf>,
    pub passlog_prefix: PathBuf,
}

impl EncodePlan {
    pub fn compute(
        request: &EncodeRequest,
        effective_source: &Path,
        effective_duration_s: f64,
        temp_source: Option<&Path>,
        passlogs: &PassLogSet,
        audio_kbps: u32,
    ) -> EngineResult<Self> {
        let audio = f64::from(audio_kbps);
        let nominal = plan_video_bitrate(effective_duration_s, request.target_size_mib, audio)?;
        let with_margin = plan_with_margin(effective_duration_s, request.target_size_mib, audio)?;

        // ffmpeg takes whole kbps; anything under 1k would be read as "no target"
        let video_kbps = with_margin.floor() as u32;
        if video_kbps == 0 {
            return Err(EngineError::Planning(format!(
                "video bitrate {with_margin:.3} kbps rounds down to zero"
            )));
        }

        let (width, height) = request.resolution.dimensions();
        Ok(Self {
            effective_source: effective_source.to_path_buf(),
            effective_duration_s,
            nominal_video_kbps: nominal,
            video_kbps,
            audio_kbps,
            width,
            height,
            output_path: derive_output_path(&request.source, &request.output_dir),
            temp_source: temp_source.map(Path::to_path_buf),
            passlog_prefix: passlogs.prefix().to_path_buf(),
        })
    }

    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}
