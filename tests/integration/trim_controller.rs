// Tests for the trim controller driven through a fake decoder

use crate::common::fakes::FakeFrameSource;
use clipsqueeze::engine::{EngineError, Resolution, TrimWindow};
use clipsqueeze::preview::{PlaybackMode, TickOutcome, TrimController};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

// Quarter-second frames keep every timestamp exact
fn loaded(duration: f64) -> TrimController<FakeFrameSource> {
    let mut controller = TrimController::new(FakeFrameSource::new(duration, 4.0))
        .with_drag_debounce(Duration::from_millis(100));
    controller.load_source(Path::new("/videos/clip.mp4")).unwrap();
    controller
}

#[test]
fn test_trim_end_at_or_before_start_is_rejected() {
    let mut controller = loaded(20.0);
    controller.seek(10.0).unwrap();
    controller.set_trim_start().unwrap();

    controller.seek(5.0).unwrap();
    let result = controller.set_trim_end();
    assert!(matches!(
        result,
        Err(EngineError::InvalidTrim { start, end }) if start == 10.0 && end == 5.0
    ));

    controller.seek(10.0).unwrap();
    assert!(controller.set_trim_end().is_err());
    assert_eq!(controller.trim(), TrimWindow { start: 10.0, end: None });
}

#[test]
fn test_trim_start_past_end_clears_end() {
    let mut controller = loaded(20.0);
    controller.seek(8.0).unwrap();
    controller.set_trim_end().unwrap();
    assert_eq!(controller.trim().end, Some(8.0));

    controller.seek(12.0).unwrap();
    let window = controller.set_trim_start().unwrap();
    assert_eq!(window, TrimWindow { start: 12.0, end: None });

    // Equal start and end is not a valid window either
    controller.seek(15.0).unwrap();
    controller.set_trim_end().unwrap();
    controller.seek(15.0).unwrap();
    assert_eq!(
        controller.set_trim_start().unwrap(),
        TrimWindow { start: 15.0, end: None }
    );
}

#[test]
fn test_reset_trim_is_idempotent() {
    let mut controller = loaded(20.0);
    controller.seek(2.0).unwrap();
    controller.set_trim_start().unwrap();
    controller.seek(6.0).unwrap();
    controller.set_trim_end().unwrap();

    controller.reset_trim();
    assert_eq!(controller.trim(), TrimWindow::full());
    controller.reset_trim();
    assert_eq!(controller.trim(), TrimWindow::full());
    assert_eq!(controller.cursor(), 6.0);
}

#[test]
fn test_ticks_suppressed_while_dragging_and_during_debounce() {
    let mut controller = loaded(20.0);
    let now = Instant::now();
    controller.play().unwrap();

    controller.drag_to(5.0).unwrap();
    assert_eq!(controller.mode(), PlaybackMode::Dragging);
    assert_eq!(controller.tick(now).unwrap(), TickOutcome::Suppressed);
    assert_eq!(controller.cursor(), 5.0);

    controller.end_drag(now);
    assert_eq!(controller.mode(), PlaybackMode::Playing);
    assert_eq!(
        controller.tick(now + Duration::from_millis(50)).unwrap(),
        TickOutcome::Suppressed
    );
    assert_eq!(controller.cursor(), 5.0);

    assert_eq!(
        controller.tick(now + Duration::from_millis(150)).unwrap(),
        TickOutcome::Advanced(5.25)
    );
}

#[test]
fn test_seek_while_playing_keeps_playing() {
    let mut controller = loaded(20.0);
    let now = Instant::now();
    controller.play().unwrap();
    assert_eq!(controller.tick(now).unwrap(), TickOutcome::Advanced(0.25));

    controller.seek(7.0).unwrap();
    assert_eq!(controller.mode(), PlaybackMode::Playing);
    assert_eq!(controller.cursor(), 7.0);
    assert_eq!(controller.tick(now).unwrap(), TickOutcome::Advanced(7.25));
    assert_eq!(controller.tick(now).unwrap(), TickOutcome::Advanced(7.5));
}

#[test]
fn test_drag_from_paused_stays_paused() {
    let mut controller = loaded(20.0);
    let now = Instant::now();

    controller.drag_to(3.0).unwrap();
    controller.drag_to(4.0).unwrap();
    controller.end_drag(now);

    assert_eq!(controller.mode(), PlaybackMode::Loaded);
    assert_eq!(controller.cursor(), 4.0);
    assert_eq!(
        controller.tick(now + Duration::from_secs(1)).unwrap(),
        TickOutcome::Idle
    );
}

#[test]
fn test_playback_wraps_to_trim_start_at_source_end() {
    let mut controller = loaded(2.0);
    controller.seek(0.5).unwrap();
    controller.set_trim_start().unwrap();
    controller.seek(1.75).unwrap();
    controller.play().unwrap();

    // present(1.75) already consumed the 1.75 frame; the decoder is now at EOF
    let outcome = controller.tick(Instant::now()).unwrap();
    assert_eq!(outcome, TickOutcome::Wrapped(0.5));
    assert_eq!(controller.cursor(), 0.5);
    assert_eq!(controller.mode(), PlaybackMode::Playing);
}

#[test]
fn test_play_from_end_rewinds_to_trim_start() {
    let mut controller = loaded(10.0);
    controller.seek(2.0).unwrap();
    controller.set_trim_start().unwrap();
    controller.seek(4.0).unwrap();
    controller.set_trim_end().unwrap();

    controller.seek(10.0).unwrap();
    controller.play().unwrap();
    assert_eq!(controller.cursor(), 2.0);

    controller.pause();
    controller.seek(1.0).unwrap();
    controller.play().unwrap();
    assert_eq!(controller.cursor(), 2.0, "before trim start also rewinds");
}

#[test]
fn test_step_falls_back_without_frame_rate() {
    let mut controller = TrimController::new(FakeFrameSource::new(10.0, 0.0));
    controller.load_source(Path::new("/videos/vfr.mkv")).unwrap();

    assert_eq!(controller.frame_interval(), 0.033);
    controller.step_forward().unwrap();
    assert!((controller.cursor() - 0.033).abs() < 1e-9);
    controller.step_backward().unwrap();
    assert_eq!(controller.cursor(), 0.0);
}

#[test]
fn test_step_forward_stops_at_last_frame() {
    let mut controller = loaded(2.0);
    controller.seek(2.0).unwrap();
    controller.step_forward().unwrap();
    assert_eq!(controller.cursor(), 1.75);
    controller.step_forward().unwrap();
    assert_eq!(controller.cursor(), 1.75);
}

#[test]
fn test_loading_new_source_closes_previous() {
    let source = FakeFrameSource::new(20.0, 4.0);
    let opens = source.opens.clone();
    let closes = source.closes.clone();
    let mut controller = TrimController::new(source);

    controller.load_source(Path::new("/videos/a.mp4")).unwrap();
    controller.seek(3.0).unwrap();
    controller.set_trim_start().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    controller.load_source(Path::new("/videos/b.mp4")).unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(controller.trim(), TrimWindow::full());
    assert_eq!(controller.cursor(), 0.0);
    assert_eq!(
        controller.media().map(|m| m.path.clone()),
        Some(PathBuf::from("/videos/b.mp4"))
    );
}

#[test]
fn test_export_request_is_a_snapshot() {
    let mut controller = loaded(20.0);
    controller.seek(4.0).unwrap();
    controller.set_trim_start().unwrap();
    controller.seek(9.0).unwrap();
    controller.set_trim_end().unwrap();

    let request = controller
        .export_request(25.0, Resolution::P480, None)
        .unwrap();
    controller.reset_trim();
    controller.seek(0.0).unwrap();

    assert_eq!(request.trim, TrimWindow { start: 4.0, end: Some(9.0) });
    assert_eq!(request.target_size_mib, 25.0);
    assert_eq!(request.resolution, Resolution::P480);
    assert_eq!(request.output_dir, PathBuf::from("/videos"));
}

#[test]
fn test_edits_require_a_loaded_source() {
    let mut controller = TrimController::new(FakeFrameSource::new(20.0, 4.0));
    assert_eq!(controller.mode(), PlaybackMode::Idle);
    assert!(matches!(controller.set_trim_start(), Err(EngineError::NoSource)));
    assert!(matches!(controller.play(), Err(EngineError::NoSource)));
    assert!(matches!(
        controller.export_request(10.0, Resolution::P720, None),
        Err(EngineError::NoSource)
    ));
}
