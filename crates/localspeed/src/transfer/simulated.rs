//! In-process link simulation
//!
//! A `Transport` that moves no real bytes. Each request streams at a fixed
//! per-stream rate, optionally capped by a shared link capacity divided among
//! all concurrent streams. Used for offline runs and for exercising the
//! controller with deterministic synthetic rates.

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{Result, SpeedError};

use super::{TransferProgress, Transport};

const TICK: Duration = Duration::from_millis(10);

/// Synthetic link with a configurable rate, capacity and latency
#[derive(Debug)]
pub struct SimulatedTransport {
    per_stream_bps: f64,
    capacity_bps: Option<f64>,
    request_bytes: u64,
    ping: Duration,
    ping_reachable: bool,
    fail_every: Option<u64>,
    active: AtomicUsize,
    requests: AtomicU64,
    failures: AtomicU64,
    largest_upload: AtomicU64,
}

/// Decrements the concurrent stream count when a request ends
struct StreamGuard<'a>(&'a AtomicUsize);

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedTransport {
    /// A link where every stream gets `per_stream_bps` bits per second
    pub fn new(per_stream_bps: f64) -> Self {
        Self {
            per_stream_bps: per_stream_bps.max(0.0),
            capacity_bps: None,
            request_bytes: 4 * 1024 * 1024,
            ping: Duration::from_millis(5),
            ping_reachable: true,
            fail_every: None,
            active: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            largest_upload: AtomicU64::new(0),
        }
    }

    /// Share at most `capacity_bps` among all concurrent streams
    pub fn with_capacity(mut self, capacity_bps: f64) -> Self {
        self.capacity_bps = Some(capacity_bps.max(0.0));
        self
    }

    /// Size of one simulated download response
    pub fn with_request_bytes(mut self, bytes: u64) -> Self {
        self.request_bytes = bytes.max(1);
        self
    }

    pub fn with_ping(mut self, ping: Duration) -> Self {
        self.ping = ping;
        self
    }

    /// Every ping fails
    pub fn with_unreachable_ping(mut self) -> Self {
        self.ping_reachable = false;
        self
    }

    /// Every `n`th transfer request fails immediately
    pub fn with_failure_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Transfer requests that failed by injection
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Largest upload body seen so far
    pub fn largest_upload(&self) -> u64 {
        self.largest_upload.load(Ordering::SeqCst)
    }

    /// Concurrent transfer requests right now
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn stream_rate(&self) -> f64 {
        let active = self.active.load(Ordering::SeqCst).max(1) as f64;
        match self.capacity_bps {
            Some(cap) => self.per_stream_bps.min(cap / active),
            None => self.per_stream_bps,
        }
    }

    fn inject_failure(&self) -> Result<()> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(every) = self.fail_every {
            if n % every == 0 {
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(SpeedError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "simulated request failure",
                )));
            }
        }
        Ok(())
    }

    fn stream(&self, size: u64, progress: &TransferProgress) -> Result<()> {
        self.inject_failure()?;
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = StreamGuard(&self.active);

        let mut sent = 0u64;
        let mut carry = 0.0f64;
        let mut last = Instant::now();
        while sent < size {
            if progress.is_stopped() {
                return Ok(());
            }
            thread::sleep(TICK);
            let now = Instant::now();
            let elapsed = now.duration_since(last).as_secs_f64();
            last = now;

            carry += self.stream_rate() * elapsed / 8.0;
            let whole = (carry.floor() as u64).min(size - sent);
            carry -= whole as f64;
            if whole > 0 {
                sent += whole;
                progress.add(whole);
            }
        }
        Ok(())
    }
}

impl Transport for SimulatedTransport {
    fn download(&self, _url: &str, progress: &TransferProgress) -> Result<()> {
        self.stream(self.request_bytes, progress)
    }

    fn upload(&self, _url: &str, body: Bytes, progress: &TransferProgress) -> Result<()> {
        let len = body.len() as u64;
        self.largest_upload.fetch_max(len, Ordering::SeqCst);
        self.stream(len, progress)
    }

    fn ping(&self, _url: &str) -> Result<Duration> {
        if !self.ping_reachable {
            return Err(SpeedError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "simulated server unreachable",
            )));
        }
        let start = Instant::now();
        thread::sleep(self.ping);
        Ok(start.elapsed())
    }
}
