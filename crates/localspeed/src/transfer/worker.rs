//! Transfer worker threads
//!
//! Each worker loops on one role until its stop flag is set. Request errors
//! are expected under saturation and retried immediately. Stopping is
//! abrupt: the thread is detached and any in-flight request is abandoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use crate::error::{Result, SpeedError};

use super::chunk::{ChunkBounds, ChunkSizeState, UploadArena};
use super::{TransferProgress, TransferSample, Transport, WorkerId};

/// What a worker does on every iteration
#[derive(Debug, Clone)]
pub enum WorkerJob {
    Download {
        url: String,
    },
    Upload {
        url: String,
        arena: UploadArena,
        bounds: ChunkBounds,
    },
}

/// Owning handle to a running worker thread
pub struct WorkerHandle {
    id: WorkerId,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a worker thread that reports into `samples`
    pub fn spawn(
        id: WorkerId,
        job: WorkerJob,
        transport: Arc<dyn Transport>,
        samples: Sender<TransferSample>,
        reporting_interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let progress = TransferProgress::new(id, reporting_interval, samples, stop.clone());

        let thread = thread::Builder::new()
            .name(format!("transfer-worker-{id}"))
            .spawn(move || run(job, transport.as_ref(), &progress))
            .map_err(|e| SpeedError::Spawn(format!("transfer worker {id}: {e}")))?;

        Ok(Self { id, stop, thread })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Signal the worker to stop. Does not wait for it.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// True once the thread has actually exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

fn run(job: WorkerJob, transport: &dyn Transport, progress: &TransferProgress) {
    let id = progress.worker_id();
    let mut failures: u64 = 0;
    debug!(worker = id, "transfer worker started");

    match job {
        WorkerJob::Download { url } => {
            while !progress.is_stopped() {
                if let Err(e) = transport.download(&url, progress) {
                    failures += 1;
                    trace!(worker = id, error = %e, "download failed, retrying");
                    thread::yield_now();
                }
            }
        }
        WorkerJob::Upload { url, arena, bounds } => {
            let mut chunk = ChunkSizeState::new(bounds);
            while !progress.is_stopped() {
                let body = arena.view(chunk.current());
                let started = Instant::now();
                match transport.upload(&url, body, progress) {
                    Ok(()) => {
                        chunk.observe(started.elapsed());
                    }
                    Err(e) => {
                        failures += 1;
                        trace!(worker = id, error = %e, "upload failed, retrying");
                        thread::yield_now();
                    }
                }
            }
        }
    }

    progress.flush();
    debug!(
        worker = id,
        bytes = progress.total(),
        failures,
        "transfer worker stopped"
    );
}
