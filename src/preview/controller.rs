use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use super::decoder::{Frame, FrameSource};
use crate::engine::{EncodeRequest, EngineError, EngineResult, MediaSource, Resolution, TrimWindow};

/// Step size when the source does not report a frame rate.
pub const FALLBACK_FRAME_INTERVAL: f64 = 0.033;

/// Playback tick, roughly 24 Hz.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(42);

/// Ticks stay suppressed this long after the last drag event.
pub const DEFAULT_DRAG_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// No source loaded.
    Idle,
    Loaded,
    /// User is scrubbing; the cursor is theirs.
    Dragging,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing.
    Idle,
    /// Dropped during a drag or its debounce window.
    Suppressed,
    Advanced(f64),
    /// Reached the end of the playback window and jumped back to the trim start.
    Wrapped(f64),
}

/// Playback cursor and trim marks for one loaded source.
pub struct TrimController<S: FrameSource> {
    source: S,
    media: Option<MediaSource>,
    mode: PlaybackMode,
    resume_playing: bool,
    cursor: f64,
    trim: TrimWindow,
    drag_debounce: Duration,
    suppress_until: Option<Instant>,
    current_frame: Option<Frame>,
}

impl<S: FrameSource> TrimController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            media: None,
            mode: PlaybackMode::Idle,
            resume_playing: false,
            cursor: 0.0,
            trim: TrimWindow::full(),
            drag_debounce: DEFAULT_DRAG_DEBOUNCE,
            suppress_until: None,
            current_frame: None,
        }
    }

    pub fn with_drag_debounce(mut self, debounce: Duration) -> Self {
        self.drag_debounce = debounce;
        self
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn trim(&self) -> TrimWindow {
        self.trim
    }

    pub fn media(&self) -> Option<&MediaSource> {
        self.media.as_ref()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_frame.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.media.as_ref().map_or(0.0, |m| m.duration)
    }

    /// Seconds per frame, falling back to `FALLBACK_FRAME_INTERVAL`.
    pub fn frame_interval(&self) -> f64 {
        self.media
            .as_ref()
            .and_then(MediaSource::frame_interval)
            .unwrap_or(FALLBACK_FRAME_INTERVAL)
    }

    /// Load a new source, discarding everything about the previous one.
    pub fn load_source(&mut self, path: &Path) -> EngineResult<&MediaSource> {
        self.unload();
        let media = self.source.open(path)?;
        debug!(path = %path.display(), duration = media.duration, fps = media.fps, "source loaded");
        self.media = Some(media);
        self.set_mode(PlaybackMode::Loaded);
        self.present(0.0)?;
        self.require_media()
    }

    /// Release the decoder and return to `Idle`.
    pub fn unload(&mut self) {
        self.source.close();
        self.media = None;
        self.cursor = 0.0;
        self.trim = TrimWindow::full();
        self.resume_playing = false;
        self.suppress_until = None;
        self.current_frame = None;
        self.set_mode(PlaybackMode::Idle);
    }

    /// Move the cursor to `t`, clamped to the source. Playback keeps running.
    pub fn seek(&mut self, t: f64) -> EngineResult<()> {
        let duration = self.require_media()?.duration;
        let target = if t.is_nan() { 0.0 } else { t.clamp(0.0, duration) };
        self.present(target)
    }

    pub fn begin_drag(&mut self) -> EngineResult<()> {
        self.require_media()?;
        if self.mode != PlaybackMode::Dragging {
            self.resume_playing = self.mode == PlaybackMode::Playing;
            self.set_mode(PlaybackMode::Dragging);
        }
        Ok(())
    }

    /// Scrub to `t`, entering `Dragging` if needed.
    pub fn drag_to(&mut self, t: f64) -> EngineResult<()> {
        self.begin_drag()?;
        self.seek(t)
    }

    /// Leave `Dragging`. Ticks stay suppressed until the debounce window after `now` passes.
    pub fn end_drag(&mut self, now: Instant) {
        if self.mode != PlaybackMode::Dragging {
            return;
        }
        let next = if self.resume_playing {
            PlaybackMode::Playing
        } else {
            PlaybackMode::Loaded
        };
        self.resume_playing = false;
        self.suppress_until = Some(now + self.drag_debounce);
        self.set_mode(next);
    }

    pub fn play(&mut self) -> EngineResult<()> {
        self.require_media()?;
        match self.mode {
            PlaybackMode::Playing => {}
            PlaybackMode::Dragging => self.resume_playing = true,
            PlaybackMode::Loaded | PlaybackMode::Idle => {
                if self.cursor >= self.playback_end() || self.cursor < self.trim.start {
                    self.present(self.trim.start)?;
                }
                self.set_mode(PlaybackMode::Playing);
            }
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        match self.mode {
            PlaybackMode::Playing => self.set_mode(PlaybackMode::Loaded),
            PlaybackMode::Dragging => self.resume_playing = false,
            _ => {}
        }
    }

    pub fn toggle_play(&mut self) -> EngineResult<()> {
        let playing = self.mode == PlaybackMode::Playing
            || (self.mode == PlaybackMode::Dragging && self.resume_playing);
        if playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Advance playback by one frame. Call at the tick interval.
    pub fn tick(&mut self, now: Instant) -> EngineResult<TickOutcome> {
        match self.mode {
            PlaybackMode::Playing => {}
            PlaybackMode::Dragging => return Ok(TickOutcome::Suppressed),
            PlaybackMode::Idle | PlaybackMode::Loaded => return Ok(TickOutcome::Idle),
        }
        if let Some(until) = self.suppress_until {
            if now < until {
                return Ok(TickOutcome::Suppressed);
            }
            self.suppress_until = None;
        }

        let end = self.playback_end();
        if self.cursor >= end {
            self.present(self.trim.start)?;
            return Ok(TickOutcome::Wrapped(self.cursor));
        }

        match self.source.read_next_frame()? {
            Some(frame) => {
                self.cursor = frame.timestamp.clamp(0.0, end);
                self.current_frame = Some(frame);
                Ok(TickOutcome::Advanced(self.cursor))
            }
            None => {
                self.present(self.trim.start)?;
                Ok(TickOutcome::Wrapped(self.cursor))
            }
        }
    }

    /// One frame forward, never past the last frame.
    pub fn step_forward(&mut self) -> EngineResult<()> {
        let duration = self.require_media()?.duration;
        let interval = self.frame_interval();
        let last_frame = (duration - interval).max(0.0);
        self.seek((self.cursor + interval).min(last_frame))
    }

    pub fn step_backward(&mut self) -> EngineResult<()> {
        self.require_media()?;
        let interval = self.frame_interval();
        self.seek((self.cursor - interval).max(0.0))
    }

    /// Mark the cursor as trim start. Always accepted; an end at or before the
    /// new start is dropped back to "end of video".
    pub fn set_trim_start(&mut self) -> EngineResult<TrimWindow> {
        self.require_media()?;
        self.trim.start = self.cursor;
        if self.trim.end.is_some_and(|end| end <= self.cursor) {
            self.trim.end = None;
        }
        debug!(start = self.trim.start, end = ?self.trim.end, "trim start set");
        Ok(self.trim)
    }

    /// Mark the cursor as trim end. Rejected, leaving the window untouched,
    /// unless the cursor is after the trim start.
    pub fn set_trim_end(&mut self) -> EngineResult<TrimWindow> {
        self.require_media()?;
        if self.cursor <= self.trim.start {
            return Err(EngineError::InvalidTrim {
                start: self.trim.start,
                end: self.cursor,
            });
        }
        self.trim.end = Some(self.cursor);
        debug!(start = self.trim.start, end = ?self.trim.end, "trim end set");
        Ok(self.trim)
    }

    pub fn reset_trim(&mut self) {
        self.trim = TrimWindow::full();
    }

    /// Snapshot the current selection as an export request. Later edits do not
    /// touch the returned value.
    pub fn export_request(
        &self,
        target_size_mib: f64,
        resolution: Resolution,
        output_dir: Option<PathBuf>,
    ) -> EngineResult<EncodeRequest> {
        let media = self.require_media()?;
        let request = EncodeRequest::new(media.path.clone(), target_size_mib, resolution)
            .with_trim(self.trim);
        Ok(match output_dir {
            Some(dir) => request.with_output_dir(dir),
            None => request,
        })
    }

    fn require_media(&self) -> EngineResult<&MediaSource> {
        self.media.as_ref().ok_or(EngineError::NoSource)
    }

    /// Where playback wraps: the trim end if set, else the end of the source.
    fn playback_end(&self) -> f64 {
        let duration = self.duration();
        self.trim.end.map_or(duration, |end| end.min(duration))
    }

    /// Seek the decoder and show the frame at `t`.
    fn present(&mut self, t: f64) -> EngineResult<()> {
        self.source.seek(t)?;
        self.cursor = t;
        if let Some(frame) = self.source.read_next_frame()? {
            self.current_frame = Some(frame);
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            debug!(from = ?self.mode, to = ?mode, "playback mode");
            self.mode = mode;
        }
    }
}
