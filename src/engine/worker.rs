// Single-slot export worker: runs the pipeline off the interactive thread

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::debug;
use uuid::Uuid;

use super::core::{CancelFlag, EncodeRequest, EngineError, EngineResult, PipelineStage};
use super::pipeline::{PipelineEvent, TranscodePipeline};

/// Message from the export thread to whoever owns the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    ExportStarted {
        job_id: Uuid,
    },

    StageStarted {
        job_id: Uuid,
        stage: PipelineStage,
    },

    ProgressUpdate {
        job_id: Uuid,
        stage: PipelineStage,
        progress_pct: f64,
        speed: Option<f64>,
        fps: Option<f64>,
        bitrate_kbps: Option<f64>,
        total_size: Option<u64>,
    },

    ExportCompleted {
        job_id: Uuid,
        output_path: PathBuf,
    },

    ExportFailed {
        job_id: Uuid,
        error: String,
    },
}

/// Clears the busy slot when the export thread ends, panics included.
struct SlotRelease(Arc<Mutex<Option<Uuid>>>);

impl Drop for SlotRelease {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Owns the one export allowed in flight at a time.
pub struct ExportWorker {
    pipeline: Arc<TranscodePipeline>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    active: Arc<Mutex<Option<Uuid>>>,
}

impl ExportWorker {
    pub fn new(pipeline: TranscodePipeline) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            pipeline: Arc::new(pipeline),
            tx,
            rx,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the receiver for worker messages
    pub fn receiver(&self) -> &Receiver<WorkerMessage> {
        &self.rx
    }

    /// Job id of the export currently running, if any
    pub fn active_job(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.active_job().is_some()
    }

    /// Start an export on its own thread. A second request while one is running
    /// is rejected with `ExportBusy`, never queued.
    pub fn spawn_export(&self, request: EncodeRequest) -> EngineResult<ExportHandle> {
        let job_id = Uuid::new_v4();
        {
            let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(EngineError::ExportBusy);
            }
            *slot = Some(job_id);
        }

        let release = SlotRelease(self.active.clone());
        let pipeline = self.pipeline.clone();
        let tx = self.tx.clone();
        let cancel = CancelFlag::new();
        let thread_cancel = cancel.clone();

        let handle = thread::spawn(move || {
            let slot = release;
            let _ = tx.send(WorkerMessage::ExportStarted { job_id });

            let tx_events = tx.clone();
            let mut on_event = move |event: PipelineEvent| {
                let message = match event {
                    PipelineEvent::StageStarted(stage) => {
                        WorkerMessage::StageStarted { job_id, stage }
                    }
                    PipelineEvent::Progress {
                        stage,
                        pct,
                        speed,
                        fps,
                        bitrate_kbps,
                        total_size,
                    } => WorkerMessage::ProgressUpdate {
                        job_id,
                        stage,
                        progress_pct: pct,
                        speed,
                        fps,
                        bitrate_kbps,
                        total_size,
                    },
                    PipelineEvent::Planned(plan) => {
                        debug!(%job_id, video_kbps = plan.video_kbps, "export plan ready");
                        return;
                    }
                };
                let _ = tx_events.send(message);
            };

            let result = pipeline.run(&request, &thread_cancel, &mut on_event);
            // Free the slot before reporting so a listener can start the next export
            drop(slot);
            match &result {
                Ok(output_path) => {
                    let _ = tx.send(WorkerMessage::ExportCompleted {
                        job_id,
                        output_path: output_path.clone(),
                    });
                }
                Err(e) => {
                    let _ = tx.send(WorkerMessage::ExportFailed {
                        job_id,
                        error: format!("{:#}", e),
                    });
                }
            }
            result
        });

        Ok(ExportHandle {
            job_id,
            cancel,
            handle,
        })
    }
}

/// Joinable, cancellable handle to one running export.
pub struct ExportHandle {
    job_id: Uuid,
    cancel: CancelFlag,
    handle: JoinHandle<EngineResult<PathBuf>>,
}

impl ExportHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Ask the export to stop. Cleanup runs the same as on any failure.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the export and return its output path.
    pub fn join(self) -> EngineResult<PathBuf> {
        self.handle
            .join()
            .unwrap_or(Err(EngineError::WorkerPanicked))
    }
}
