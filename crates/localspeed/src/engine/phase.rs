//! Phase runner
//!
//! Runs one directional phase on a `phase-controller` thread: spawns the
//! initial workers, folds their samples into the `PoolController`, drives
//! the UI and evaluation ticks, and on stop terminates every worker and
//! sends exactly one `PhaseSpeed` back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::error::{Result, SpeedError};
use crate::options::TestOptions;
use crate::transfer::{
    ChunkBounds, TransferSample, Transport, UploadArena, WorkerHandle, WorkerId, WorkerJob,
};
use crate::types::Direction;

use super::controller::{PhaseSpeed, PoolController, ScalingDecision};
use super::events::{EventBus, TestEvent};
use super::tuning::EngineTuning;

/// Everything one phase needs, resolved from the test options
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub direction: Direction,
    pub url: String,
    pub max_threads: usize,
    pub duration: Duration,
    pub reporting_interval: Duration,
    pub chunk_bounds: ChunkBounds,
    pub tuning: EngineTuning,
}

impl PhaseConfig {
    pub fn from_options(options: &TestOptions, direction: Direction) -> Self {
        let url = match direction {
            Direction::Download => options.download_url(),
            Direction::Upload => options.upload_url(),
        };
        Self {
            direction,
            url,
            max_threads: options.effective_max_threads(),
            duration: options.test_duration(),
            reporting_interval: options.reporting_interval(),
            chunk_bounds: options.device_profile.chunk_bounds(),
            tuning: options.tuning.clone(),
        }
    }
}

/// Cloneable stop signal for a running phase
#[derive(Debug, Clone, Default)]
pub struct PhaseStop(Arc<AtomicBool>);

impl PhaseStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the phase to stop. Returns true only for the call that
    /// actually flipped the flag.
    pub fn stop(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a phase running on its controller thread
pub struct RunningPhase {
    direction: Direction,
    stop: PhaseStop,
    result_rx: Receiver<PhaseSpeed>,
    thread: JoinHandle<()>,
}

/// Start a phase. Returns once the controller thread is running.
pub fn start_phase(
    config: PhaseConfig,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
) -> Result<RunningPhase> {
    let direction = config.direction;
    let stop = PhaseStop::new();
    let (result_tx, result_rx) = bounded(1);

    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name("phase-controller".to_string())
        .spawn(move || run(config, transport, events, thread_stop, result_tx))
        .map_err(|e| SpeedError::Spawn(format!("{direction} phase controller: {e}")))?;

    Ok(RunningPhase {
        direction,
        stop,
        result_rx,
        thread,
    })
}

impl RunningPhase {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stop_handle(&self) -> PhaseStop {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the phase result, aborting the phase if `timeout` passes first
    pub fn wait(self, timeout: Duration) -> Result<PhaseSpeed> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(speed) => Ok(speed),
            Err(RecvTimeoutError::Timeout) => {
                self.stop.stop();
                warn!(direction = %self.direction, "phase timed out, aborting");
                Err(SpeedError::PhaseTimeout(self.direction))
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(direction = %self.direction, "phase controller exited without a result");
                Err(SpeedError::Cancelled)
            }
        }
    }
}

/// Spawns workers for one phase, all sharing the sample channel
const MIN_TICK: Duration = Duration::from_millis(1);
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `base + by`, pinned to a far-off instant instead of overflowing
fn instant_after(base: Instant, by: Duration) -> Instant {
    base.checked_add(by)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

struct WorkerSpawner {
    config: PhaseConfig,
    arena: Option<UploadArena>,
    transport: Arc<dyn Transport>,
    samples: Sender<TransferSample>,
}

impl WorkerSpawner {
    fn job(&self) -> WorkerJob {
        match &self.arena {
            Some(arena) => WorkerJob::Upload {
                url: self.config.url.clone(),
                arena: arena.clone(),
                bounds: self.config.chunk_bounds,
            },
            None => WorkerJob::Download {
                url: self.config.url.clone(),
            },
        }
    }

    fn spawn(&self, id: WorkerId) -> Result<WorkerHandle> {
        WorkerHandle::spawn(
            id,
            self.job(),
            self.transport.clone(),
            self.samples.clone(),
            self.config.reporting_interval,
        )
    }
}

fn run(
    config: PhaseConfig,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    stop: PhaseStop,
    result_tx: Sender<PhaseSpeed>,
) {
    let direction = config.direction;
    let ui_every = config.tuning.ui_interval().max(MIN_TICK);
    let eval_every = config.tuning.evaluation_interval().max(MIN_TICK);
    let (sample_tx, sample_rx) = unbounded();

    // One buffer per phase; workers hand out views of it
    let arena = match direction {
        Direction::Upload => Some(UploadArena::allocate(config.chunk_bounds)),
        Direction::Download => None,
    };

    let started = Instant::now();
    let deadline = instant_after(started, config.duration);
    let mut controller = PoolController::new(direction, &config.tuning, config.max_threads, started);
    let spawner = WorkerSpawner {
        config,
        arena,
        transport,
        samples: sample_tx,
    };

    let mut workers: Vec<WorkerHandle> = Vec::new();
    for id in controller.start() {
        match spawner.spawn(id) {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                warn!(%direction, worker = id, error = %e, "could not start worker");
                controller.worker_failed(id);
            }
        }
    }
    info!(
        %direction,
        workers = workers.len(),
        max_threads = spawner.config.max_threads,
        "phase started"
    );

    let mut next_ui = instant_after(started, ui_every);
    let mut next_eval = instant_after(started, eval_every);

    while !stop.is_stopped() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let wake = next_ui.min(next_eval).min(deadline);
        match sample_rx.recv_timeout(wake.saturating_duration_since(now)) {
            Ok(sample) => {
                controller.record_sample(&sample);
                for sample in sample_rx.try_iter() {
                    controller.record_sample(&sample);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // The spawner holds a sender, so this never fires while we loop
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if now >= next_ui {
            events.emit(TestEvent::SpeedUpdate(controller.ui_tick(now)));
            while next_ui <= now {
                next_ui = instant_after(next_ui, ui_every);
            }
        }
        if now >= next_eval {
            match controller.evaluate(now) {
                ScalingDecision::Add(id) => match spawner.spawn(id) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        warn!(%direction, worker = id, error = %e, "could not add worker");
                        controller.worker_failed(id);
                    }
                },
                ScalingDecision::Remove(id) => {
                    if let Some(pos) = workers.iter().position(|w| w.id() == id) {
                        workers.remove(pos).stop();
                    }
                }
                ScalingDecision::Hold => {}
            }
            while next_eval <= now {
                next_eval = instant_after(next_eval, eval_every);
            }
        }
    }

    // Abrupt: flag every worker and detach, in-flight requests are abandoned
    for worker in &workers {
        worker.stop();
    }
    for sample in sample_rx.try_iter() {
        controller.record_sample(&sample);
    }

    let now = Instant::now();
    if let Some(speed) = controller.finish(now) {
        info!(
            %direction,
            mbps = speed.bits_per_second / 1_000_000.0,
            workers = speed.workers,
            elapsed_ms = speed.elapsed.as_millis() as u64,
            "phase finished"
        );
        let _ = result_tx.send(speed);
    }
}
