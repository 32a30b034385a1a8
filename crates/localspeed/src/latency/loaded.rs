//! Latency under load
//!
//! Runs beside a transfer phase on its own thread, pinging once per interval
//! over the transport's keep-alive probe connection. Each observation is
//! broadcast; the phase reports the mean.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::engine::events::{EventBus, TestEvent};
use crate::error::{Result, SpeedError};
use crate::transfer::{sleep_unless_stopped, Transport};
use crate::types::Direction;

use super::mean;

/// Handle to a running loaded-latency prober
pub struct LoadedProbe {
    direction: Direction,
    stop: Arc<AtomicBool>,
    samples: Arc<Mutex<Vec<f64>>>,
    thread: JoinHandle<()>,
}

impl LoadedProbe {
    /// Start probing `url` every `interval` until `finish` is called.
    /// The first probe goes out one interval after start, once the
    /// transfer has had time to load the link.
    pub fn start(
        transport: Arc<dyn Transport>,
        url: String,
        direction: Direction,
        interval: Duration,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let samples = Arc::new(Mutex::new(Vec::new()));

        let thread_stop = stop.clone();
        let thread_samples = samples.clone();
        let thread = thread::Builder::new()
            .name(format!("loaded-probe-{}", direction.as_str()))
            .spawn(move || {
                while sleep_unless_stopped(interval, &thread_stop) {
                    match transport.ping(&url) {
                        Ok(rtt) => {
                            // The phase may have finished while we waited
                            if thread_stop.load(Ordering::Relaxed) {
                                break;
                            }
                            let latency_ms = rtt.as_secs_f64() * 1000.0;
                            if let Ok(mut s) = thread_samples.lock() {
                                s.push(latency_ms);
                            }
                            events.emit(TestEvent::LatencyUpdate {
                                direction,
                                latency_ms,
                            });
                        }
                        Err(e) => trace!(%direction, error = %e, "loaded probe failed"),
                    }
                }
            })
            .map_err(|e| SpeedError::Spawn(format!("loaded latency probe: {e}")))?;

        Ok(Self {
            direction,
            stop,
            samples,
            thread,
        })
    }

    /// Observations so far, in milliseconds
    pub fn samples(&self) -> Vec<f64> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop probing and return the mean loaded latency (0 when nothing was
    /// observed). An in-flight probe is abandoned.
    pub fn finish(self) -> f64 {
        self.stop.store(true, Ordering::Relaxed);
        let samples = self.samples();
        let average = mean(&samples);
        debug!(
            direction = %self.direction,
            samples = samples.len(),
            average_ms = average,
            "loaded latency probe finished"
        );
        average
    }
}
