// Tests for the single-slot export worker and its messages

use crate::common::fakes::{FakeProber, FakeTranscoder};
use crate::common::helpers::{Workspace, file_names};
use clipsqueeze::engine::{
    EngineError, ExportWorker, PipelineStage, Prober, Resolution, TranscodePipeline, Transcoder,
    TrimWindow, WorkerMessage,
};
use std::sync::Arc;
use std::time::Duration;

fn worker(ws: &Workspace, duration: f64, transcoder: FakeTranscoder) -> ExportWorker {
    ExportWorker::new(TranscodePipeline::new(
        Arc::new(FakeProber::new(&ws.source, duration)) as Arc<dyn Prober>,
        Arc::new(transcoder) as Arc<dyn Transcoder>,
        ws.options(),
    ))
}

#[test]
fn test_worker_starts_idle() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::ok());
    assert!(!worker.is_busy());
    assert_eq!(worker.active_job(), None);
    assert!(worker.receiver().try_recv().is_err());
}

#[test]
fn test_export_completes_and_reports() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::ok());

    let handle = worker.spawn_export(ws.request(10.0, Resolution::P720)).unwrap();
    let job_id = handle.job_id();
    assert_eq!(handle.join().unwrap(), ws.expected_output());
    assert!(!worker.is_busy());

    let messages: Vec<WorkerMessage> = worker.receiver().try_iter().collect();
    assert_eq!(messages.first(), Some(&WorkerMessage::ExportStarted { job_id }));
    assert!(messages.contains(&WorkerMessage::StageStarted {
        job_id,
        stage: PipelineStage::Pass1
    }));
    assert!(messages.contains(&WorkerMessage::StageStarted {
        job_id,
        stage: PipelineStage::Pass2
    }));
    assert_eq!(
        messages.last(),
        Some(&WorkerMessage::ExportCompleted {
            job_id,
            output_path: ws.expected_output()
        })
    );
    assert!(messages.iter().any(|m| matches!(
        m,
        WorkerMessage::ProgressUpdate { progress_pct, .. } if *progress_pct > 0.0
    )));
    assert!(messages.iter().any(|m| matches!(
        m,
        WorkerMessage::ProgressUpdate {
            fps: Some(_),
            bitrate_kbps: Some(_),
            total_size: Some(_),
            ..
        }
    )));
}

#[test]
fn test_second_export_is_rejected_while_one_runs() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::blocking());
    let request = ws
        .request(10.0, Resolution::P720)
        .with_trim(TrimWindow::new(5.0, Some(20.0)).unwrap());

    let first = worker.spawn_export(request.clone()).unwrap();
    assert!(worker.is_busy());
    assert_eq!(worker.active_job(), Some(first.job_id()));

    let second = worker.spawn_export(request);
    assert!(matches!(second, Err(EngineError::ExportBusy)));

    first.cancel();
    assert!(matches!(first.join(), Err(EngineError::Cancelled)));
    assert!(!worker.is_busy());
    assert!(file_names(&ws.temp_dir).is_empty(), "cancel must remove the extract");
    assert!(file_names(&ws.passlog_dir).is_empty());
}

#[test]
fn test_cancel_during_pass1_removes_unfinished_passlogs() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::blocking());

    let handle = worker.spawn_export(ws.request(10.0, Resolution::P720)).unwrap();
    let job_id = handle.job_id();
    loop {
        let message = worker
            .receiver()
            .recv_timeout(Duration::from_secs(5))
            .expect("pass 1 never started");
        if message
            == (WorkerMessage::StageStarted {
                job_id,
                stage: PipelineStage::Pass1,
            })
        {
            break;
        }
    }

    handle.cancel();
    assert!(matches!(handle.join(), Err(EngineError::Cancelled)));
    assert!(
        file_names(&ws.passlog_dir).is_empty(),
        "left behind: {:?}",
        file_names(&ws.passlog_dir)
    );
    assert!(file_names(&ws.out_dir).is_empty());
}

#[test]
fn test_slot_frees_after_failure() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::failing_at(PipelineStage::Pass1));

    let handle = worker.spawn_export(ws.request(10.0, Resolution::P480)).unwrap();
    let job_id = handle.job_id();
    let err = handle.join().unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Pass1));

    let failure = worker
        .receiver()
        .try_iter()
        .find_map(|m| match m {
            WorkerMessage::ExportFailed { job_id: id, error } if id == job_id => Some(error),
            _ => None,
        })
        .expect("failure message");
    assert!(failure.contains("pass1"), "unexpected error text: {failure}");

    // A new export is accepted once the slot is free
    let retry = worker.spawn_export(ws.request(10.0, Resolution::P480)).unwrap();
    assert!(retry.join().is_err());
}

#[test]
fn test_request_snapshot_is_independent() {
    let ws = Workspace::new();
    let worker = worker(&ws, 60.0, FakeTranscoder::ok());
    let mut request = ws.request(10.0, Resolution::P720);

    let handle = worker.spawn_export(request.clone()).unwrap();
    // Editing the caller's copy does not reach the running export
    request.trim = TrimWindow {
        start: 10.0,
        end: Some(5.0),
    };
    assert!(handle.join().is_ok());
}
