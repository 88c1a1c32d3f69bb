use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use super::controller::FALLBACK_FRAME_INTERVAL;
use crate::engine::{EngineError, EngineResult, MediaSource, probe_media_source};

/// One decoded preview frame, packed RGB24.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Source position of this frame in seconds.
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Decode-for-preview capability consumed by the trim controller.
///
/// One open handle per loaded source; `open` on a new path releases the old one.
pub trait FrameSource: Send {
    fn open(&mut self, path: &Path) -> EngineResult<MediaSource>;

    /// Position the next `read_next_frame` at `seconds`.
    fn seek(&mut self, seconds: f64) -> EngineResult<()>;

    /// Next frame, or `None` at end of stream.
    fn read_next_frame(&mut self) -> EngineResult<Option<Frame>>;

    fn close(&mut self);
}

/// Streams scaled raw frames out of an ffmpeg child process.
/// A seek restarts the child at the new offset.
pub struct FfmpegFrameSource {
    width: u32,
    height: u32,
    media: Option<MediaSource>,
    position: f64,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl FfmpegFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(2),
            height: height.max(2),
            media: None,
            position: 0.0,
            child: None,
            stdout: None,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn frame_interval(&self) -> f64 {
        self.media
            .as_ref()
            .and_then(MediaSource::frame_interval)
            .unwrap_or(FALLBACK_FRAME_INTERVAL)
    }

    fn start_stream(&mut self, path: &Path) -> EngineResult<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", self.position))
            .arg("-i")
            .arg(path)
            .arg("-an")
            .arg("-vf")
            .arg(format!("scale={}:{}", self.width, self.height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Decode(format!("failed to spawn ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Decode("ffmpeg stdout not captured".to_string()))?;
        debug!(position = self.position, "preview stream started");
        self.stdout = Some(BufReader::new(stdout));
        self.child = Some(child);
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            if let Err(e) = child.wait() {
                warn!(error = %e, "failed to reap preview decoder");
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, path: &Path) -> EngineResult<MediaSource> {
        self.close();
        let media = probe_media_source(path)?;
        self.media = Some(media.clone());
        self.position = 0.0;
        Ok(media)
    }

    fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        if self.media.is_none() {
            return Err(EngineError::NoSource);
        }
        self.stop_stream();
        self.position = seconds.max(0.0);
        Ok(())
    }

    fn read_next_frame(&mut self) -> EngineResult<Option<Frame>> {
        let path = match &self.media {
            Some(media) => media.path.clone(),
            None => return Err(EngineError::NoSource),
        };
        if self.stdout.is_none() {
            self.start_stream(&path)?;
        }

        let mut rgb = vec![0u8; self.frame_len()];
        let read = match self.stdout.as_mut() {
            Some(stdout) => stdout.read_exact(&mut rgb),
            None => return Ok(None),
        };
        match read {
            Ok(()) => {
                let frame = Frame {
                    timestamp: self.position,
                    width: self.width,
                    height: self.height,
                    rgb,
                };
                self.position += self.frame_interval();
                Ok(Some(frame))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.stop_stream();
                Ok(None)
            }
            Err(e) => {
                self.stop_stream();
                Err(EngineError::Decode(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        self.stop_stream();
        self.media = None;
        self.position = 0.0;
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.stop_stream();
    }
}
