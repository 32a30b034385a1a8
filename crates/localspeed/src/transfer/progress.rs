//! Per-worker progress reporting
//!
//! Transports add bytes as fragments arrive (download) or as the HTTP stack
//! pulls them from the request body (upload). Samples are forwarded to the
//! controller at most once per reporting interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::{TransferSample, WorkerId};

struct ProgressInner {
    worker_id: WorkerId,
    total: AtomicU64,
    last_report: Mutex<Option<Instant>>,
    interval: Duration,
    samples: Sender<TransferSample>,
    stop: Arc<AtomicBool>,
}

/// Cheaply cloneable byte counter + throttled reporter for one worker
#[derive(Clone)]
pub struct TransferProgress {
    inner: Arc<ProgressInner>,
}

impl TransferProgress {
    pub fn new(
        worker_id: WorkerId,
        interval: Duration,
        samples: Sender<TransferSample>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                worker_id,
                total: AtomicU64::new(0),
                last_report: Mutex::new(None),
                interval,
                samples,
                stop,
            }),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.inner.worker_id
    }

    /// Bytes transferred by this worker so far
    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    /// True once the worker has been told to stop
    pub fn is_stopped(&self) -> bool {
        self.inner.stop.load(Ordering::Relaxed)
    }

    /// Record `bytes` more transferred, reporting if the throttle allows
    pub fn add(&self, bytes: u64) {
        let cumulative = self.inner.total.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.report_at(cumulative, Instant::now());
    }

    /// Report the current total regardless of the throttle
    pub fn flush(&self) {
        let now = Instant::now();
        if let Ok(mut last) = self.inner.last_report.lock() {
            *last = Some(now);
        }
        self.send(self.total(), now);
    }

    fn report_at(&self, cumulative: u64, now: Instant) {
        {
            let Ok(mut last) = self.inner.last_report.lock() else {
                return;
            };
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.inner.interval {
                    return;
                }
            }
            *last = Some(now);
        }
        self.send(cumulative, now);
    }

    fn send(&self, cumulative: u64, now: Instant) {
        let sample = TransferSample {
            worker_id: self.inner.worker_id,
            cumulative_bytes: cumulative,
            timestamp: now,
        };
        // Controller gone: nobody will ever read our counts again
        if self.inner.samples.send(sample).is_err() {
            self.inner.stop.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn progress(
        interval_ms: u64,
    ) -> (
        TransferProgress,
        crossbeam_channel::Receiver<TransferSample>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        (
            TransferProgress::new(7, Duration::from_millis(interval_ms), tx, stop.clone()),
            rx,
            stop,
        )
    }

    #[test]
    fn first_add_reports_immediately() {
        let (p, rx, _) = progress(50);
        p.add(100);
        let s = rx.try_recv().unwrap();
        assert_eq!(s.worker_id, 7);
        assert_eq!(s.cumulative_bytes, 100);
    }

    #[test]
    fn reports_are_throttled() {
        let (p, rx, _) = progress(10_000);
        for _ in 0..100 {
            p.add(10);
        }
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(p.total(), 1000);
    }

    #[test]
    fn report_spacing_respects_interval() {
        let (p, rx, _) = progress(30);
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(200) {
            p.add(1);
            std::thread::sleep(Duration::from_millis(2));
        }
        let samples: Vec<_> = rx.try_iter().collect();
        assert!(samples.len() >= 2);
        for pair in samples.windows(2) {
            let gap = pair[1].timestamp.duration_since(pair[0].timestamp);
            assert!(gap >= Duration::from_millis(30));
            assert!(pair[1].cumulative_bytes >= pair[0].cumulative_bytes);
        }
    }

    #[test]
    fn dropped_receiver_stops_worker() {
        let (p, rx, stop) = progress(0);
        drop(rx);
        assert!(!p.is_stopped());
        p.add(1);
        assert!(p.is_stopped());
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn flush_sends_throttled_bytes() {
        let (p, rx, _) = progress(10_000);
        p.add(100);
        p.add(50);
        p.flush();
        let totals: Vec<u64> = rx.try_iter().map(|s| s.cumulative_bytes).collect();
        assert_eq!(totals, vec![100, 150]);
    }

    #[test]
    fn clones_share_the_counter() {
        let (p, _rx, _) = progress(50);
        let q = p.clone();
        p.add(5);
        q.add(7);
        assert_eq!(p.total(), 12);
    }
}
