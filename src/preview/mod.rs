// Interactive trim/preview: controller state machine and the frame decoder it drives

pub mod controller;
pub mod decoder;

pub use controller::{
    DEFAULT_DRAG_DEBOUNCE, DEFAULT_TICK_INTERVAL, FALLBACK_FRAME_INTERVAL, PlaybackMode,
    TickOutcome, TrimController,
};
pub use decoder::{FfmpegFrameSource, Frame, FrameSource};

/// Label shown for a trim end that runs to the end of the source.
pub const OPEN_END_LABEL: &str = "End of video";

/// `MM:SS.mmm`, minutes unbounded.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}.{:03}", minutes, secs, millis)
}

/// Trim end as displayed: a timestamp or `End of video`.
pub fn format_trim_end(end: Option<f64>) -> String {
    end.map_or_else(|| OPEN_END_LABEL.to_string(), format_timestamp)
}

/// Parse `12.5`, `MM:SS(.mmm)` or `HH:MM:SS(.mmm)` into seconds.
pub fn parse_timestamp(input: &str) -> Result<f64, String> {
    let trimmed = input.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("time must be a non-negative number, got {trimmed:?}"));
        }
        return Ok(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, secs) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => {
            return Err(format!(
                "invalid time {trimmed:?}; use seconds (12.5), MM:SS.mmm or HH:MM:SS.mmm"
            ));
        }
    };
    let hours: u32 = hours
        .parse()
        .map_err(|_| format!("invalid hours in {trimmed:?}"))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| format!("invalid minutes in {trimmed:?}"))?;
    let secs: f64 = secs
        .parse()
        .map_err(|_| format!("invalid seconds in {trimmed:?}"))?;
    if parts.len() == 3 && minutes >= 60 {
        return Err(format!("minutes must be below 60 in {trimmed:?}"));
    }
    if !(0.0..60.0).contains(&secs) {
        return Err(format!("seconds must be below 60 in {trimmed:?}"));
    }
    Ok(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + secs)
}
