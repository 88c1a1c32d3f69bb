use std::path::PathBuf;
use thiserror::Error;

use super::types::PipelineStage;

/// Errors surfaced by the probe, planner, pipeline and trim controller.
///
/// None of these are fatal to the process; hosts report them and carry on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to probe {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("Invalid trim: end ({end:.3}s) must be after start ({start:.3}s)")]
    InvalidTrim { start: f64, end: f64 },

    #[error("Cannot plan encode: {0}")]
    Planning(String),

    #[error("Sub-range extraction failed: {0}")]
    Extraction(String),

    #[error("Transcode failed during {stage}: {message}")]
    Transcode {
        stage: PipelineStage,
        message: String,
    },

    #[error("An export is already running")]
    ExportBusy,

    #[error("Export cancelled")]
    Cancelled,

    #[error("No video loaded")]
    NoSource,

    #[error("Preview decode failed: {0}")]
    Decode(String),

    #[error("Export worker panicked")]
    WorkerPanicked,
}

impl EngineError {
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Pipeline stage that failed, if this error came from an external process.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Extraction(_) => Some(PipelineStage::Extract),
            Self::Transcode { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
