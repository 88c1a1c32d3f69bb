mod advisor;
mod bitrate;
mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod plan;
mod types;

pub use advisor::{
    Recommendation, ResolutionChoice, fallback_recommendation, recommend, recommend_for_probe,
};
pub use bitrate::{
    DEFAULT_AUDIO_BITRATE_KBPS, SIZE_SAFETY_MARGIN, plan_video_bitrate, plan_with_margin,
};
pub use error::{EngineError, EngineResult};
pub use ffmpeg_cmd::{
    RunFailure, build_extract_cmd, build_pass1_cmd, build_pass2_cmd, format_ffmpeg_cmd,
    null_output_target, run_ffmpeg_once,
};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version, parse_ffprobe_duration, probe_duration};
pub use log::write_debug_log;
pub use plan::{EncodePlan, PassLogSet, derive_output_path};
pub use types::{
    CancelFlag, EncodeRequest, EncodeSettings, PipelineStage, ProgressParser,
    Resolution, TrimWindow,
};
