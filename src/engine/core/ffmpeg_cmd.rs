use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::log::write_debug_log;
use super::plan::EncodePlan;
use super::types::{CancelFlag, EncodeSettings, ProgressParser, TrimWindow};

const STDERR_TAIL_LINES: usize = 10;

/// Longest a cancel waits before the child is killed.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where pass 1 sends its discarded output.
pub fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// Seconds as ffmpeg time arguments, millisecond precision.
fn fmt_seconds(secs: f64) -> String {
    format!("{:.3}", secs)
}

fn apply_additional_args(cmd: &mut Command, additional_args: &str) {
    let trimmed = additional_args.trim();
    if trimmed.is_empty() {
        return;
    }
    match shlex::split(trimmed) {
        Some(args) => {
            cmd.args(args);
        }
        None => warn!(args = trimmed, "ignoring unparsable extra encoder arguments"),
    }
}

fn base_cmd(input: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y").arg("-i").arg(input);
    // Structured key=value progress on stdout
    cmd.arg("-progress").arg("-").arg("-nostats");
    cmd
}

/// Lossless sub-range copy of `trim` from `source` into `dest`.
pub fn build_extract_cmd(source: &Path, trim: &TrimWindow, dest: &Path) -> Command {
    let mut cmd = base_cmd(source);
    cmd.arg("-ss").arg(fmt_seconds(trim.start));
    if let Some(end) = trim.end {
        cmd.arg("-t").arg(fmt_seconds(end - trim.start));
    }
    cmd.arg("-c").arg("copy");
    cmd.arg(dest);
    cmd
}

fn build_pass_cmd(plan: &EncodePlan, settings: &EncodeSettings, pass: u8) -> Command {
    let mut cmd = base_cmd(&plan.effective_source);

    cmd.arg("-c:v").arg(&settings.video_codec);
    cmd.arg("-preset").arg(&settings.preset);
    cmd.arg("-b:v").arg(format!("{}k", plan.video_kbps));
    cmd.arg("-pass").arg(pass.to_string());
    cmd.arg("-passlogfile").arg(&plan.passlog_prefix);
    cmd.arg("-vf").arg(plan.scale_filter());

    if pass == 1 {
        // Stats only: no audio, null muxer
        cmd.arg("-an");
        cmd.arg("-f").arg("null").arg(null_output_target());
    } else {
        cmd.arg("-c:a").arg(&settings.audio_codec);
        cmd.arg("-b:a").arg(format!("{}k", plan.audio_kbps));
        apply_additional_args(&mut cmd, &settings.extra_args);
        cmd.arg(&plan.output_path);
    }
    cmd
}

/// Pass 1: gather rate statistics into the pass-log files.
pub fn build_pass1_cmd(plan: &EncodePlan, settings: &EncodeSettings) -> Command {
    build_pass_cmd(plan, settings, 1)
}

/// Pass 2: final muxed output with audio.
pub fn build_pass2_cmd(plan: &EncodePlan, settings: &EncodeSettings) -> Command {
    build_pass_cmd(plan, settings, 2)
}

/// Render a command the way a user would paste it into a shell.
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if arg.contains(' ') {
            parts.push(format!("\"{}\"", arg));
        } else {
            parts.push(arg.into_owned());
        }
    }
    parts.join(" ")
}

/// Why an ffmpeg invocation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// Spawn error or non-zero exit, with the tail of stderr.
    Failed(String),
    Cancelled,
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run one ffmpeg invocation to completion, reporting progress lines as they arrive.
///
/// A watcher thread polls the cancel flag and kills the child, so a cancel lands
/// within one poll interval even while ffmpeg prints nothing.
pub fn run_ffmpeg_once(
    mut cmd: Command,
    cancel: &CancelFlag,
    on_progress: &mut dyn FnMut(&ProgressParser),
) -> Result<(), RunFailure> {
    let rendered = format_ffmpeg_cmd(&cmd);
    debug!(cmd = %rendered, "running ffmpeg");
    let _ = write_debug_log(&format!("Running: {rendered}"));

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| RunFailure::Failed(format!("Failed to spawn ffmpeg: {e}")))?;

    let stderr = child.stderr.take();
    let stderr_thread = thread::spawn(move || {
        let mut stderr_output = String::new();
        if let Some(stderr) = stderr {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                stderr_output.push_str(&line);
                stderr_output.push('\n');
            }
        }
        stderr_output
    });

    let stdout = child.stdout.take();
    let child = Arc::new(Mutex::new(child));
    let finished = Arc::new(AtomicBool::new(false));
    let watcher = {
        let child = child.clone();
        let finished = finished.clone();
        let cancel = cancel.clone();
        thread::spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                if cancel.is_cancelled() {
                    // Killing closes stdout, which ends the progress loop below
                    let _ = child.lock().unwrap_or_else(PoisonError::into_inner).kill();
                    return;
                }
                thread::sleep(CANCEL_POLL_INTERVAL);
            }
        })
    };

    let mut parser = ProgressParser::new();
    if let Some(stdout) = stdout {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if cancel.is_cancelled() {
                break;
            }
            parser.parse_line(&line);
            on_progress(&parser);
        }
    }
    finished.store(true, Ordering::SeqCst);
    let _ = watcher.join();

    let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
    if cancel.is_cancelled() {
        let _ = child.kill();
        let _ = child.wait();
        let _ = stderr_thread.join();
        let _ = write_debug_log("Cancelled: ffmpeg killed");
        return Err(RunFailure::Cancelled);
    }

    let status = child
        .wait()
        .map_err(|e| RunFailure::Failed(format!("Failed to wait for ffmpeg: {e}")))?;
    let stderr_output = stderr_thread
        .join()
        .unwrap_or_else(|_| "Failed to capture stderr".to_string());

    if status.success() {
        return Ok(());
    }

    let _ = write_debug_log(&format!("ffmpeg exited with {status}\n{stderr_output}"));
    let tail = stderr_tail(&stderr_output);
    Err(RunFailure::Failed(if tail.is_empty() {
        format!("ffmpeg exited with {status}")
    } else {
        format!("ffmpeg exited with {status}: {tail}")
    }))
}
