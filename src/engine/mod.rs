// Export engine - independent of any interactive host

pub mod core;
pub mod pipeline;
pub mod probe;
pub mod worker;

pub use core::*;
pub use pipeline::{
    DryRun, FfmpegTranscoder, PipelineEvent, PipelineOptions, TranscodePipeline, Transcoder,
};
pub use probe::{FfprobeProber, MediaSource, Prober, is_video_file, probe_media_source};
pub use worker::{ExportHandle, ExportWorker, WorkerMessage};
