//! Test orchestration
//!
//! `SpeedTest` sequences one run: idle latency, download with loaded
//! latency, cooldown, upload with loaded latency, cooldown, then hands the
//! result to a `ResultSink`. Only one run may be in flight per instance.
//! Any phase failure aborts the run and nothing is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::engine::events::{EventBus, TestEvent};
use crate::engine::phase::{start_phase, PhaseConfig, PhaseStop};
use crate::error::{Result, SpeedError};
use crate::latency::{IdleProber, LoadedProbe};
use crate::options::TestOptions;
use crate::transfer::{sleep_unless_stopped, Transport};
use crate::types::{ConnectionMode, Direction, PhaseResult, TestResult};

/// Receives each completed test result
pub trait ResultSink: Send + Sync {
    fn save(&self, result: &TestResult) -> Result<()>;
}

/// Discards results
pub struct NoopSink;

impl ResultSink for NoopSink {
    fn save(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }
}

/// Clears the in-flight flag when a run ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One speed test setup, runnable repeatedly (one run at a time)
pub struct SpeedTest {
    options: TestOptions,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ResultSink>,
    events: Arc<EventBus>,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    current_phase: Mutex<Option<PhaseStop>>,
}

impl SpeedTest {
    pub fn new(
        options: TestOptions,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            options,
            transport,
            sink,
            events: Arc::new(EventBus::new()),
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            current_phase: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    /// Subscribe to the events of all future runs
    pub fn subscribe(&self) -> Receiver<TestEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Abort the current run. Running workers are terminated abruptly and
    /// `run` returns `SpeedError::Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(current) = self.current_phase.lock() {
            if let Some(stop) = current.as_ref() {
                stop.stop();
            }
        }
    }

    /// Run one complete test, blocking until it finishes
    pub fn run(&self) -> Result<TestResult> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SpeedError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);
        self.cancelled.store(false, Ordering::SeqCst);

        let outcome = self.run_sequence();
        if let Err(e) = &outcome {
            warn!(error = %e, "speed test failed");
            self.events.emit(TestEvent::Error(e.user_message().to_string()));
        }
        outcome
    }

    fn run_sequence(&self) -> Result<TestResult> {
        self.options.validate()?;
        let max_threads = self.options.effective_max_threads();
        let mode = ConnectionMode::from_max_threads(max_threads);
        info!(server = %self.options.server_url, max_threads, "speed test started");
        self.events.emit(TestEvent::TestStarted);

        let idle = IdleProber::from_options(&self.options).run(
            self.transport.as_ref(),
            &self.options.ping_url(),
            &self.cancelled,
        );
        self.check_cancelled()?;
        self.events.emit(TestEvent::IdleLatency(idle));

        let download = self.run_phase(Direction::Download)?;
        self.cooldown()?;
        let upload = self.run_phase(Direction::Upload)?;
        self.cooldown()?;

        let result = TestResult::new(idle, download, upload, mode);
        info!(
            ping_ms = result.ping_ms,
            jitter_ms = result.jitter_ms,
            download_mbps = download.speed_mbps(),
            upload_mbps = upload.speed_mbps(),
            "speed test complete"
        );
        self.events.emit(TestEvent::TestComplete(result));

        self.sink.save(&result).map_err(|e| match e {
            SpeedError::Persistence(_) => e,
            other => SpeedError::Persistence(other.to_string()),
        })?;
        Ok(result)
    }

    fn run_phase(&self, direction: Direction) -> Result<PhaseResult> {
        self.events.emit(TestEvent::PhaseStarted(direction));
        let config = PhaseConfig::from_options(&self.options, direction);
        let phase = start_phase(config, self.transport.clone(), self.events.clone())?;
        self.set_current_phase(Some(phase.stop_handle()));
        // A cancel that landed before the phase was registered
        if self.cancelled.load(Ordering::SeqCst) {
            phase.stop_handle().stop();
        }

        let probe = match LoadedProbe::start(
            self.transport.clone(),
            self.options.ping_url(),
            direction,
            self.options.loaded_probe_interval(),
            self.events.clone(),
        ) {
            Ok(probe) => Some(probe),
            Err(e) => {
                warn!(%direction, error = %e, "loaded latency probe unavailable");
                None
            }
        };

        let outcome = phase.wait(self.options.phase_timeout());
        let loaded_ping_ms = probe.map(LoadedProbe::finish).unwrap_or(0.0);
        self.set_current_phase(None);

        let speed = outcome?;
        self.check_cancelled()?;

        let result = PhaseResult {
            direction,
            speed_bits_per_second: speed.bits_per_second,
            loaded_ping_ms,
            workers: speed.workers,
        };
        self.events.emit(TestEvent::PhaseComplete(result));
        Ok(result)
    }

    /// Pause between phases while displays return to zero
    fn cooldown(&self) -> Result<()> {
        self.events.emit(TestEvent::DisplayReset);
        if !sleep_unless_stopped(self.options.cooldown(), &self.cancelled) {
            return Err(SpeedError::Cancelled);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SpeedError::Cancelled);
        }
        Ok(())
    }

    fn set_current_phase(&self, stop: Option<PhaseStop>) {
        if let Ok(mut current) = self.current_phase.lock() {
            *current = stop;
        }
    }
}
