use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::cli::{Cli, Commands, ExportArgs};
use clipsqueeze::config::Config;
use clipsqueeze::engine::{
    self, EncodeRequest, ExportHandle, ExportWorker, PipelineStage, Resolution, TranscodePipeline,
    TrimWindow, WorkerMessage,
};
use clipsqueeze::preview::{
    FfmpegFrameSource, FrameSource, TickOutcome, TrimController, format_timestamp,
    format_trim_end, parse_timestamp,
};

pub fn run(cli: Cli) {
    let result = match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::Probe { file } => handle_probe(&file),
        Commands::Plan(args) => handle_plan(&args),
        Commands::Compress(args) => handle_compress(&args),
        Commands::Session { file } => handle_session(&file),
        Commands::InitConfig => handle_init_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn handle_check_ffmpeg() -> Result<()> {
    println!("ffmpeg found: {}", engine::ffmpeg_version()?);
    println!("ffprobe found: {}", engine::ffprobe_version()?);
    Ok(())
}

fn handle_probe(file: &Path) -> Result<()> {
    match engine::probe_media_source(file) {
        Ok(media) => {
            println!("File:     {}", media.path.display());
            println!("Duration: {} ({:.3}s)", format_timestamp(media.duration), media.duration);
            if media.fps > 0.0 {
                println!("FPS:      {:.3}", media.fps);
            } else {
                println!("FPS:      unknown");
            }
            println!("Frames:   {}", media.frame_count);
            println!("Size:     {}x{}", media.width, media.height);
            let recommendation = engine::recommend(media.duration);
            println!("Resolutions: {}", recommendation.labels().join(", "));
            Ok(())
        }
        Err(e) => {
            let fallback = engine::fallback_recommendation();
            println!("Resolutions: {}", fallback.labels().join(", "));
            Err(e.into())
        }
    }
}

/// Turn CLI flags plus config defaults into an export request.
fn build_request(args: &ExportArgs, config: &Config) -> EncodeRequest {
    let resolution = match &args.resolution {
        Some(label) => Resolution::from_label(label).unwrap_or_else(|| {
            tracing::warn!(label = %label, "unknown resolution, using 720p");
            Resolution::default()
        }),
        None => match engine::probe_duration(&args.file) {
            Ok(duration) => engine::recommend(duration).selected,
            Err(e) => {
                tracing::warn!(error = %e, "probe failed, using configured resolution");
                config.default_resolution()
            }
        },
    };

    let request = EncodeRequest::new(
        args.file.clone(),
        args.size.unwrap_or(config.defaults.target_size_mib),
        resolution,
    )
    .with_trim(TrimWindow {
        start: args.start.unwrap_or(0.0),
        end: args.end,
    });

    match args.output_dir.clone().or_else(|| config.defaults.output_dir.clone()) {
        Some(dir) => request.with_output_dir(dir),
        None => request,
    }
}

fn handle_plan(args: &ExportArgs) -> Result<()> {
    let config = Config::load()?;
    let pipeline = TranscodePipeline::system(config.pipeline_options());
    let request = build_request(args, &config);
    let dry_run = pipeline.dry_run(&request)?;
    let plan = &dry_run.plan;

    println!("Source:      {}", request.source.display());
    println!(
        "Trim:        {} -> {}",
        format_timestamp(request.trim.start),
        format_trim_end(request.trim.end)
    );
    println!("Duration:    {:.3}s", plan.effective_duration_s);
    println!(
        "Bitrate:     {}k video ({:.1}k before margin), {}k audio",
        plan.video_kbps, plan.nominal_video_kbps, plan.audio_kbps
    );
    println!("Scale:       {}x{}", plan.width, plan.height);
    println!("Output:      {}", plan.output_path.display());
    println!();
    for (stage, cmd) in &dry_run.commands {
        println!("[{}] {}", stage, cmd);
    }
    Ok(())
}

fn stage_label(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Extract => "Extracting",
        PipelineStage::Pass1 => "Pass 1/2",
        PipelineStage::Pass2 => "Pass 2/2",
    }
}

fn handle_compress(args: &ExportArgs) -> Result<()> {
    let config = Config::load()?;
    let worker = ExportWorker::new(TranscodePipeline::system(config.pipeline_options()));
    let request = build_request(args, &config);
    println!(
        "Compressing {} to {} MiB at {}",
        request.source.display(),
        request.target_size_mib,
        request.resolution
    );

    let handle = worker.spawn_export(request)?;
    loop {
        let message = match worker.receiver().recv_timeout(Duration::from_millis(250)) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) if !handle.is_finished() => continue,
            Err(_) => break,
        };
        match message {
            WorkerMessage::StageStarted { stage, .. } => {
                println!("{}...", stage_label(stage));
            }
            WorkerMessage::ProgressUpdate {
                stage,
                progress_pct,
                speed,
                fps,
                total_size,
                ..
            } => {
                print!("\r{}: {:.1}%", stage_label(stage), progress_pct);
                if let Some(fps) = fps {
                    print!(" | {:.1} fps", fps);
                }
                if let Some(speed) = speed {
                    print!(" | Speed: {:.2}x", speed);
                }
                if let Some(bytes) = total_size {
                    print!(" | {:.2} MiB", bytes as f64 / (1024.0 * 1024.0));
                }
                io::stdout().flush().ok();
            }
            WorkerMessage::ExportCompleted { .. } | WorkerMessage::ExportFailed { .. } => {
                println!();
                break;
            }
            WorkerMessage::ExportStarted { .. } => {}
        }
    }

    let output = handle.join()?;
    println!("Done: {}", output.display());
    Ok(())
}

fn handle_init_config() -> Result<()> {
    let path = Config::config_path()?;
    if Config::exists() {
        println!("Config already exists at {}", path.display());
    } else {
        Config::ensure_default()?;
        println!("Created default config at {}", path.display());
    }
    Ok(())
}

const SESSION_HELP: &str = "\
Commands:
  play | pause | toggle        start/stop looping playback
  seek <t> | drag <t>          jump / scrub to a time (12.5, 1:02.5, 0:01:02)
  release                      finish a drag
  next | prev                  step one frame
  in | out | reset             mark trim start / trim end / clear marks
  status                       show cursor, marks and export state
  export [size_mib] [res]      export the current selection
  cancel                       cancel the running export
  quit";

enum SessionFlow {
    Continue,
    Quit,
}

/// Line-driven host for the trim controller.
struct Session<S: FrameSource> {
    controller: TrimController<S>,
    worker: ExportWorker,
    export: Option<ExportHandle>,
    config: Config,
    recommended: Resolution,
}

impl<S: FrameSource> Session<S> {
    fn handle_line(&mut self, line: &str) -> Result<SessionFlow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(SessionFlow::Continue);
        };
        let arg = words.next();

        match command {
            "play" => self.controller.play()?,
            "pause" => self.controller.pause(),
            "toggle" => self.controller.toggle_play()?,
            "seek" => self.controller.seek(time_arg(arg)?)?,
            "drag" => self.controller.drag_to(time_arg(arg)?)?,
            "release" => self.controller.end_drag(Instant::now()),
            "next" => self.controller.step_forward()?,
            "prev" => self.controller.step_backward()?,
            "in" => {
                let trim = self.controller.set_trim_start()?;
                println!("Start: {}  End: {}", format_timestamp(trim.start), format_trim_end(trim.end));
            }
            "out" => {
                let trim = self.controller.set_trim_end()?;
                println!("Start: {}  End: {}", format_timestamp(trim.start), format_trim_end(trim.end));
            }
            "reset" => self.controller.reset_trim(),
            "status" => self.print_status(),
            "export" => self.start_export(arg, words.next())?,
            "cancel" => match &self.export {
                Some(handle) => handle.cancel(),
                None => println!("No export running"),
            },
            "help" | "?" => println!("{SESSION_HELP}"),
            "quit" | "q" | "exit" => return Ok(SessionFlow::Quit),
            other => println!("Unknown command '{other}' (try 'help')"),
        }
        Ok(SessionFlow::Continue)
    }

    fn start_export(&mut self, size: Option<&str>, resolution: Option<&str>) -> Result<()> {
        let size = match size {
            Some(s) => s
                .parse::<f64>()
                .with_context(|| format!("invalid size '{s}'"))?,
            None => self.config.defaults.target_size_mib,
        };
        let resolution = resolution.map_or(self.recommended, Resolution::from_label_or_default);
        let request = self.controller.export_request(
            size,
            resolution,
            self.config.defaults.output_dir.clone(),
        )?;
        let handle = self.worker.spawn_export(request)?;
        println!("Export {} started", handle.job_id());
        self.export = Some(handle);
        Ok(())
    }

    fn print_status(&self) {
        println!(
            "{:?} at {} / {}",
            self.controller.mode(),
            format_timestamp(self.controller.cursor()),
            format_timestamp(self.controller.duration())
        );
        let trim = self.controller.trim();
        println!("Start: {}  End: {}", format_timestamp(trim.start), format_trim_end(trim.end));
        match self.worker.active_job() {
            Some(id) => println!("Export {id} running"),
            None => println!("No export running"),
        }
    }

    fn on_tick(&mut self) {
        match self.controller.tick(Instant::now()) {
            Ok(TickOutcome::Wrapped(at)) => println!("Looped to {}", format_timestamp(at)),
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error: {:#}", e);
                self.controller.pause();
            }
        }
    }

    fn poll_worker(&mut self) {
        while let Ok(message) = self.worker.receiver().try_recv() {
            match message {
                WorkerMessage::StageStarted { stage, .. } => println!("{}...", stage_label(stage)),
                WorkerMessage::ExportCompleted { output_path, .. } => {
                    println!("Export done: {}", output_path.display())
                }
                WorkerMessage::ExportFailed { error, .. } => eprintln!("Export failed: {error}"),
                WorkerMessage::ExportStarted { .. } | WorkerMessage::ProgressUpdate { .. } => {}
            }
        }
        if self.export.as_ref().is_some_and(ExportHandle::is_finished) {
            if let Some(handle) = self.export.take() {
                let _ = handle.join();
            }
        }
    }

    /// Stop any running export and wait for its cleanup.
    fn shutdown(&mut self) {
        if let Some(handle) = self.export.take() {
            println!("Cancelling export...");
            handle.cancel();
            let _ = handle.join();
        }
        self.poll_worker();
        self.controller.unload();
    }
}

fn time_arg(arg: Option<&str>) -> Result<f64> {
    let arg = arg.context("missing time argument")?;
    parse_timestamp(arg).map_err(anyhow::Error::msg)
}

fn handle_session(file: &Path) -> Result<()> {
    let config = Config::load()?;
    let source = FfmpegFrameSource::new(config.preview.frame_width, config.preview.frame_height);
    let mut controller = TrimController::new(source).with_drag_debounce(config.drag_debounce());
    let media = controller.load_source(file)?.clone();
    let recommendation = engine::recommend(media.duration);

    println!(
        "Loaded {} ({}, {:.3} fps)",
        media.path.display(),
        format_timestamp(media.duration),
        media.fps
    );
    println!("Resolutions: {}", recommendation.labels().join(", "));
    println!("{SESSION_HELP}");

    let worker = ExportWorker::new(TranscodePipeline::system(config.pipeline_options()));
    let tick = config.tick_interval();
    let mut session = Session {
        controller,
        worker,
        export: None,
        config,
        recommended: recommendation.selected,
    };

    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut input_open = true;
    let mut next_tick = Instant::now() + tick;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        if input_open {
            match rx.recv_timeout(wait) {
                Ok(line) => match session.handle_line(&line) {
                    Ok(SessionFlow::Quit) => break,
                    Ok(SessionFlow::Continue) => {}
                    Err(e) => eprintln!("Error: {:#}", e),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => input_open = false,
            }
        } else if session.export.is_none() {
            break;
        } else {
            thread::sleep(wait);
        }

        let now = Instant::now();
        if now >= next_tick {
            session.on_tick();
            next_tick = (next_tick + tick).max(now);
        }
        session.poll_worker();
    }

    session.shutdown();
    Ok(())
}
