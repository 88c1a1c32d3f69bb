#![allow(dead_code)]

use clipsqueeze::engine::{
    CancelFlag, EngineError, EngineResult, MediaSource, PipelineStage, Prober, ProgressParser,
    RunFailure, Transcoder,
};
use clipsqueeze::preview::{Frame, FrameSource};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::helpers::args_of;

/// Reports a fixed duration for the source and another for anything extracted from it.
pub struct FakeProber {
    source: PathBuf,
    source_duration: f64,
    extracted_duration: f64,
    fail: bool,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeProber {
    pub fn new(source: &Path, source_duration: f64) -> Self {
        Self {
            source: source.to_path_buf(),
            source_duration,
            extracted_duration: source_duration,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_extracted_duration(mut self, duration: f64) -> Self {
        self.extracted_duration = duration;
        self
    }

    pub fn failing(source: &Path) -> Self {
        Self {
            fail: true,
            ..Self::new(source, 0.0)
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl Prober for FakeProber {
    fn probe_duration(&self, path: &Path) -> EngineResult<f64> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        if self.fail {
            return Err(EngineError::probe(path, "moov atom not found"));
        }
        Ok(if path == self.source {
            self.source_duration
        } else {
            self.extracted_duration
        })
    }
}

/// Stands in for ffmpeg: writes the files each stage would write and records the arguments.
#[derive(Default)]
pub struct FakeTranscoder {
    fail_at: Option<PipelineStage>,
    block_until_cancelled: bool,
    runs: Mutex<Vec<(PipelineStage, Vec<String>)>>,
}

impl FakeTranscoder {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: PipelineStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    /// Every stage spins until the export is cancelled. Pass 1 leaves its
    /// in-progress `.temp` stats files behind, as a killed ffmpeg would.
    pub fn blocking() -> Self {
        Self {
            block_until_cancelled: true,
            ..Self::default()
        }
    }

    pub fn stages(&self) -> Vec<PipelineStage> {
        self.runs.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn args_for(&self, stage: PipelineStage) -> Option<Vec<String>> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, args)| args.clone())
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl Transcoder for FakeTranscoder {
    fn run(
        &self,
        stage: PipelineStage,
        cmd: Command,
        cancel: &CancelFlag,
        on_progress: &mut dyn FnMut(&ProgressParser),
    ) -> Result<(), RunFailure> {
        let args = args_of(&cmd);
        self.runs.lock().unwrap().push((stage, args.clone()));

        if self.block_until_cancelled {
            if stage == PipelineStage::Pass1 {
                // libx264 stats before the rename on a clean close
                let prefix = flag_value(&args, "-passlogfile").unwrap();
                fs::write(format!("{prefix}-0.log.temp"), b"stats").unwrap();
                fs::write(format!("{prefix}-0.log.mbtree.temp"), b"mbtree").unwrap();
            }
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            return Err(RunFailure::Cancelled);
        }

        let mut parser = ProgressParser::new();
        for line in [
            "fps=48.0",
            "bitrate=812.5kbits/s",
            "total_size=1048576",
            "out_time_us=1000000",
            "speed=2.5x",
        ] {
            parser.parse_line(line);
        }
        on_progress(&parser);

        let last = args.last().cloned().unwrap_or_default();
        let failing = self.fail_at == Some(stage);
        match stage {
            PipelineStage::Extract if !failing => fs::write(&last, b"extracted").unwrap(),
            PipelineStage::Pass1 => {
                let prefix = flag_value(&args, "-passlogfile").unwrap();
                fs::write(format!("{prefix}-0.log"), b"stats").unwrap();
                fs::write(format!("{prefix}-0.log.mbtree"), b"mbtree").unwrap();
            }
            PipelineStage::Pass2 => {
                let body: &[u8] = if failing { b"partial" } else { b"encoded" };
                fs::write(&last, body).unwrap();
            }
            _ => {}
        }

        if failing {
            return Err(RunFailure::Failed("ffmpeg exited with exit status: 1".into()));
        }
        parser.parse_line("progress=end");
        on_progress(&parser);
        Ok(())
    }
}

/// In-memory decoder producing empty frames at a fixed rate.
pub struct FakeFrameSource {
    duration: f64,
    fps: f64,
    position: Option<f64>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeFrameSource {
    pub fn new(duration: f64, fps: f64) -> Self {
        Self {
            duration,
            fps,
            position: None,
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn step(&self) -> f64 {
        if self.fps > 0.0 { 1.0 / self.fps } else { 0.033 }
    }
}

impl FrameSource for FakeFrameSource {
    fn open(&mut self, path: &Path) -> EngineResult<MediaSource> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.position = Some(0.0);
        Ok(MediaSource {
            path: path.to_path_buf(),
            duration: self.duration,
            fps: self.fps,
            frame_count: (self.duration * self.fps).round() as u64,
            width: 1280,
            height: 720,
        })
    }

    fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        match self.position {
            Some(_) => {
                self.position = Some(seconds);
                Ok(())
            }
            None => Err(EngineError::NoSource),
        }
    }

    fn read_next_frame(&mut self) -> EngineResult<Option<Frame>> {
        let position = self.position.ok_or(EngineError::NoSource)?;
        if position >= self.duration {
            return Ok(None);
        }
        self.position = Some(position + self.step());
        Ok(Some(Frame {
            timestamp: position,
            width: 2,
            height: 2,
            rgb: vec![0; 12],
        }))
    }

    fn close(&mut self) {
        if self.position.take().is_some() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
