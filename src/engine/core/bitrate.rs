use super::error::{EngineError, EngineResult};

/// Audio bitrate assumed by the planner and used for pass 2.
pub const DEFAULT_AUDIO_BITRATE_KBPS: f64 = 128.0;

/// Fraction of the requested size actually budgeted, leaving room for container overhead.
pub const SIZE_SAFETY_MARGIN: f64 = 0.98;

/// Video bitrate (kbps) that fills `target_size_mib` over `effective_duration_s`
/// once `audio_bitrate_kbps` is accounted for.
pub fn plan_video_bitrate(
    effective_duration_s: f64,
    target_size_mib: f64,
    audio_bitrate_kbps: f64,
) -> EngineResult<f64> {
    if !(effective_duration_s > 0.0) || !effective_duration_s.is_finite() {
        return Err(EngineError::Planning(format!(
            "effective duration must be positive, got {effective_duration_s}s"
        )));
    }
    if !(target_size_mib > 0.0) || !target_size_mib.is_finite() {
        return Err(EngineError::Planning(format!(
            "target size must be positive, got {target_size_mib} MiB"
        )));
    }

    let target_size_kib = target_size_mib * 1024.0;
    let total_kbps = target_size_kib * 8.0 / effective_duration_s;
    let video_kbps = total_kbps - audio_bitrate_kbps;

    if video_kbps <= 0.0 {
        return Err(EngineError::Planning(format!(
            "{target_size_mib} MiB over {effective_duration_s:.2}s leaves no room for video after {audio_bitrate_kbps} kbps audio"
        )));
    }
    Ok(video_kbps)
}

/// Same as `plan_video_bitrate` with the size shrunk by `SIZE_SAFETY_MARGIN`.
pub fn plan_with_margin(
    effective_duration_s: f64,
    target_size_mib: f64,
    audio_bitrate_kbps: f64,
) -> EngineResult<f64> {
    plan_video_bitrate(
        effective_duration_s,
        target_size_mib * SIZE_SAFETY_MARGIN,
        audio_bitrate_kbps,
    )
}
