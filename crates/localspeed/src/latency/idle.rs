//! Idle latency probing
//!
//! A short burst of sequential pings before any load is applied. Leading
//! probes are discarded since they pay for connection setup.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::options::TestOptions;
use crate::transfer::Transport;

use super::{summarize, LatencyStats};

/// Consecutive failures, before any success, after which the server is
/// treated as unreachable
const MAX_LEADING_FAILURES: usize = 3;

/// Sequential round-trip prober
#[derive(Debug, Clone, Copy)]
pub struct IdleProber {
    probes: usize,
    warmup: usize,
}

impl IdleProber {
    pub fn new(probes: usize, warmup: usize) -> Self {
        Self {
            probes: probes.max(1),
            warmup,
        }
    }

    pub fn from_options(options: &TestOptions) -> Self {
        Self::new(options.idle_probes, options.idle_warmup_probes)
    }

    /// Probe `url` and summarize. Never fails: an unreachable server yields
    /// `LatencyStats::unknown()`.
    pub fn run(&self, transport: &dyn Transport, url: &str, stop: &AtomicBool) -> LatencyStats {
        let mut rtts = Vec::with_capacity(self.probes);
        let mut leading_failures = 0;

        for attempt in 0..self.probes {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match transport.ping(url) {
                Ok(rtt) => rtts.push(rtt.as_secs_f64() * 1000.0),
                Err(e) => {
                    debug!(attempt, error = %e, "idle probe failed");
                    if rtts.is_empty() {
                        leading_failures += 1;
                        if leading_failures >= MAX_LEADING_FAILURES {
                            warn!(url, "latency endpoint unreachable, reporting unknown ping");
                            return LatencyStats::unknown();
                        }
                    }
                }
            }
        }

        // Too few successes to spare any: keep them all
        let measured = if rtts.len() > self.warmup {
            &rtts[self.warmup..]
        } else {
            &rtts[..]
        };
        let stats = summarize(measured);
        debug!(
            ping_ms = stats.min_ms,
            jitter_ms = stats.jitter_ms,
            samples = stats.samples,
            "idle latency measured"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SpeedError};
    use crate::transfer::TransferProgress;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a scripted list of ping outcomes (None = failure)
    struct ScriptedPing {
        script: Mutex<Vec<Option<f64>>>,
        calls: AtomicUsize,
    }

    impl ScriptedPing {
        fn new(script: &[Option<f64>]) -> Self {
            let mut script = script.to_vec();
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for ScriptedPing {
        fn download(&self, _url: &str, _progress: &TransferProgress) -> Result<()> {
            Ok(())
        }

        fn upload(&self, _url: &str, _body: Bytes, _progress: &TransferProgress) -> Result<()> {
            Ok(())
        }

        fn ping(&self, _url: &str) -> Result<Duration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop().flatten() {
                Some(ms) => Ok(Duration::from_secs_f64(ms / 1000.0)),
                None => Err(SpeedError::Io(std::io::Error::other("refused"))),
            }
        }
    }

    fn ok(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn reports_min_and_jitter_after_warmup() {
        let transport = ScriptedPing::new(&ok(&[80.0, 45.0, 20.0, 22.0, 19.0, 21.0, 20.0]));
        let stop = AtomicBool::new(false);
        let stats = IdleProber::new(7, 2).run(&transport, "sim://ping", &stop);
        assert!((stats.min_ms - 19.0).abs() < 1e-3);
        assert!((stats.jitter_ms - 2.0).abs() < 1e-3);
        assert_eq!(stats.samples, 5);
    }

    #[test]
    fn unreachable_server_is_unknown() {
        let transport = ScriptedPing::new(&[None; 12]);
        let stop = AtomicBool::new(false);
        let stats = IdleProber::new(12, 2).run(&transport, "sim://ping", &stop);
        assert!(!stats.is_known());
        assert_eq!(transport.calls(), MAX_LEADING_FAILURES);
    }

    #[test]
    fn failures_after_success_are_skipped() {
        let transport = ScriptedPing::new(&[
            Some(10.0),
            None,
            Some(12.0),
            None,
            None,
            None,
            Some(11.0),
        ]);
        let stop = AtomicBool::new(false);
        let stats = IdleProber::new(7, 0).run(&transport, "sim://ping", &stop);
        assert_eq!(transport.calls(), 7);
        assert_eq!(stats.samples, 3);
        assert!((stats.min_ms - 10.0).abs() < 1e-3);
    }

    #[test]
    fn warmup_larger_than_successes_keeps_everything() {
        let transport = ScriptedPing::new(&ok(&[30.0, 31.0]));
        let stop = AtomicBool::new(false);
        let stats = IdleProber::new(2, 5).run(&transport, "sim://ping", &stop);
        assert_eq!(stats.samples, 2);
        assert!((stats.min_ms - 30.0).abs() < 1e-3);
    }

    #[test]
    fn stop_flag_short_circuits() {
        let transport = ScriptedPing::new(&ok(&[10.0; 12]));
        let stop = AtomicBool::new(true);
        let stats = IdleProber::new(12, 2).run(&transport, "sim://ping", &stop);
        assert_eq!(transport.calls(), 0);
        assert!(!stats.is_known());
    }
}
