// Size-targeted export: optional sub-range copy, re-probe, plan, two passes, cleanup

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use super::core::{
    CancelFlag, EncodePlan, EncodeRequest, EncodeSettings, EngineError, EngineResult, PassLogSet,
    PipelineStage, ProgressParser, RunFailure, build_extract_cmd, build_pass1_cmd,
    build_pass2_cmd, format_ffmpeg_cmd, run_ffmpeg_once,
};
use super::probe::{FfprobeProber, Prober};

const TEMP_PREFIX: &str = "clipsqueeze-";
const TEMP_SUFFIX: &str = ".mp4";

/// Runs one external-process stage. Swappable so tests can avoid ffmpeg.
pub trait Transcoder: Send + Sync {
    fn run(
        &self,
        stage: PipelineStage,
        cmd: Command,
        cancel: &CancelFlag,
        on_progress: &mut dyn FnMut(&ProgressParser),
    ) -> Result<(), RunFailure>;
}

/// `Transcoder` that spawns the ffmpeg binary on PATH.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegTranscoder;

impl Transcoder for FfmpegTranscoder {
    fn run(
        &self,
        _stage: PipelineStage,
        cmd: Command,
        cancel: &CancelFlag,
        on_progress: &mut dyn FnMut(&ProgressParser),
    ) -> Result<(), RunFailure> {
        run_ffmpeg_once(cmd, cancel, on_progress)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub settings: EncodeSettings,
    /// Directory holding `ffmpeg2pass-0.log*` while an export runs.
    pub passlog_dir: PathBuf,
    /// Directory for extracted sub-range files.
    pub temp_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            settings: EncodeSettings::default(),
            passlog_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Progress notifications emitted while `run` executes.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted(PipelineStage),
    Progress {
        stage: PipelineStage,
        pct: f64,
        speed: Option<f64>,
        fps: Option<f64>,
        bitrate_kbps: Option<f64>,
        /// Bytes written so far.
        total_size: Option<u64>,
    },
    Planned(EncodePlan),
}

/// Plan plus the command lines an export would run.
#[derive(Debug, Clone)]
pub struct DryRun {
    pub plan: EncodePlan,
    pub commands: Vec<(PipelineStage, String)>,
}

/// Removes the pass-log files when dropped, on every exit path.
struct PassLogGuard<'a>(&'a PassLogSet);

impl Drop for PassLogGuard<'_> {
    fn drop(&mut self) {
        self.0.remove_all();
    }
}

/// Extracted sub-range owned by one run; deleted when dropped.
struct ScratchSource(Option<TempPath>);

impl ScratchSource {
    fn path(&self) -> &Path {
        self.0.as_deref().unwrap_or(Path::new(""))
    }
}

impl Drop for ScratchSource {
    fn drop(&mut self) {
        let Some(temp) = self.0.take() else {
            return;
        };
        let shown = temp.display().to_string();
        match temp.close() {
            Ok(()) => debug!(path = %shown, "removed extracted sub-range"),
            Err(e) => warn!(path = %shown, error = %e, "failed to remove extracted sub-range"),
        }
    }
}

pub struct TranscodePipeline {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    options: PipelineOptions,
}

impl TranscodePipeline {
    pub fn new(
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            prober,
            transcoder,
            options,
        }
    }

    /// Pipeline driving the real ffprobe and ffmpeg binaries.
    pub fn system(options: PipelineOptions) -> Self {
        Self::new(Arc::new(FfprobeProber), Arc::new(FfmpegTranscoder), options)
    }

    /// Run one export to completion and return the output path.
    ///
    /// The extracted sub-range and the pass-log files never outlive this call.
    /// A partially written output from a failed pass 2 is left for inspection.
    pub fn run(
        &self,
        request: &EncodeRequest,
        cancel: &CancelFlag,
        on_event: &mut dyn FnMut(PipelineEvent),
    ) -> EngineResult<PathBuf> {
        precheck(request)?;
        info!(
            source = %request.source.display(),
            start = request.trim.start,
            end = ?request.trim.end,
            size_mib = request.target_size_mib,
            resolution = %request.resolution,
            "export started"
        );

        let passlogs = PassLogSet::in_dir(&self.options.passlog_dir);
        let _passlog_guard = PassLogGuard(&passlogs);

        let scratch = self.extract_if_needed(request, cancel, on_event)?;
        let effective_source = scratch.as_ref().map_or(request.source.as_path(), |s| s.path());

        // The copy snaps to keyframes, so plan against what was actually written
        let effective_duration = self.prober.probe_duration(effective_source)?;
        let plan = EncodePlan::compute(
            request,
            effective_source,
            effective_duration,
            scratch.as_ref().map(|s| s.path()),
            &passlogs,
            self.options.settings.audio_bitrate_kbps,
        )?;
        info!(
            duration = plan.effective_duration_s,
            nominal_kbps = plan.nominal_video_kbps,
            video_kbps = plan.video_kbps,
            scale = %plan.scale_filter(),
            "export planned"
        );
        on_event(PipelineEvent::Planned(plan.clone()));

        if let Some(dir) = plan.output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| EngineError::Transcode {
                stage: PipelineStage::Pass2,
                message: format!("cannot create output directory {}: {e}", dir.display()),
            })?;
        }

        let settings = &self.options.settings;
        let duration = plan.effective_duration_s;
        self.run_stage(
            PipelineStage::Pass1,
            build_pass1_cmd(&plan, settings),
            duration,
            cancel,
            on_event,
        )?;
        self.run_stage(
            PipelineStage::Pass2,
            build_pass2_cmd(&plan, settings),
            duration,
            cancel,
            on_event,
        )?;

        info!(output = %plan.output_path.display(), "export finished");
        Ok(plan.output_path)
    }

    /// Plan an export without running any encoder. Trimmed sources are estimated
    /// from the requested window since nothing is extracted.
    pub fn dry_run(&self, request: &EncodeRequest) -> EngineResult<DryRun> {
        precheck(request)?;
        let source_duration = self.prober.probe_duration(&request.source)?;
        let passlogs = PassLogSet::in_dir(&self.options.passlog_dir);

        let mut commands = Vec::new();
        let (effective_source, duration, temp) = if request.trim.narrows(source_duration) {
            let placeholder = self
                .options
                .temp_dir
                .join(format!("{TEMP_PREFIX}XXXXXX{TEMP_SUFFIX}"));
            let cmd = build_extract_cmd(&request.source, &request.trim, &placeholder);
            commands.push((PipelineStage::Extract, format_ffmpeg_cmd(&cmd)));
            let length = request.trim.length(source_duration);
            (placeholder.clone(), length, Some(placeholder))
        } else {
            (request.source.clone(), source_duration, None)
        };

        let plan = EncodePlan::compute(
            request,
            &effective_source,
            duration,
            temp.as_deref(),
            &passlogs,
            self.options.settings.audio_bitrate_kbps,
        )?;
        let settings = &self.options.settings;
        commands.push((
            PipelineStage::Pass1,
            format_ffmpeg_cmd(&build_pass1_cmd(&plan, settings)),
        ));
        commands.push((
            PipelineStage::Pass2,
            format_ffmpeg_cmd(&build_pass2_cmd(&plan, settings)),
        ));
        Ok(DryRun { plan, commands })
    }

    fn extract_if_needed(
        &self,
        request: &EncodeRequest,
        cancel: &CancelFlag,
        on_event: &mut dyn FnMut(PipelineEvent),
    ) -> EngineResult<Option<ScratchSource>> {
        let trim = &request.trim;
        if !trim.is_set() {
            debug!("no trim window, skipping extraction");
            return Ok(None);
        }
        let source_duration = self.prober.probe_duration(&request.source)?;
        if !trim.narrows(source_duration) {
            debug!(source_duration, "trim window covers the whole source, skipping extraction");
            return Ok(None);
        }

        fs::create_dir_all(&self.options.temp_dir).map_err(|e| {
            EngineError::Extraction(format!(
                "cannot create temp directory {}: {e}",
                self.options.temp_dir.display()
            ))
        })?;
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.options.temp_dir)
            .map_err(|e| EngineError::Extraction(format!("cannot create temp file: {e}")))?
            .into_temp_path();
        let scratch = ScratchSource(Some(temp));

        // Open-ended windows run to the end of the source
        let expected = trim.length(source_duration);
        self.run_stage(
            PipelineStage::Extract,
            build_extract_cmd(&request.source, trim, scratch.path()),
            expected,
            cancel,
            on_event,
        )?;
        Ok(Some(scratch))
    }

    fn run_stage(
        &self,
        stage: PipelineStage,
        cmd: Command,
        duration_s: f64,
        cancel: &CancelFlag,
        on_event: &mut dyn FnMut(PipelineEvent),
    ) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        debug!(%stage, "stage started");
        on_event(PipelineEvent::StageStarted(stage));

        let mut forward = |parser: &ProgressParser| {
            on_event(PipelineEvent::Progress {
                stage,
                pct: parser.progress_pct(duration_s),
                speed: parser.speed,
                fps: parser.fps,
                bitrate_kbps: parser.bitrate_kbps,
                total_size: parser.total_size,
            });
        };
        match self.transcoder.run(stage, cmd, cancel, &mut forward) {
            Ok(()) => Ok(()),
            Err(RunFailure::Cancelled) => {
                info!(%stage, "export cancelled");
                Err(EngineError::Cancelled)
            }
            Err(RunFailure::Failed(message)) => {
                warn!(%stage, error = %message, "stage failed");
                Err(match stage {
                    PipelineStage::Extract => EngineError::Extraction(message),
                    _ => EngineError::Transcode { stage, message },
                })
            }
        }
    }
}

/// Checks that need no external process. Runs before anything is spawned.
fn precheck(request: &EncodeRequest) -> EngineResult<()> {
    request.trim.validate()?;
    if !(request.target_size_mib > 0.0) || !request.target_size_mib.is_finite() {
        return Err(EngineError::Planning(format!(
            "target size must be positive, got {} MiB",
            request.target_size_mib
        )));
    }
    Ok(())
}
