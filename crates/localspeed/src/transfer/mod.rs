//! Transfer workers
//!
//! Workers repeatedly download from or upload to the companion server on
//! their own threads and report cumulative byte counts to the phase
//! controller. The `Transport` trait separates the retry/report loop from
//! the HTTP client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::Result;

pub mod chunk;
pub mod http;
pub mod progress;
pub mod simulated;
pub mod worker;

pub use chunk::{ChunkBounds, ChunkSizeState, UploadArena};
pub use http::HttpTransport;
pub use progress::TransferProgress;
pub use simulated::SimulatedTransport;
pub use worker::{WorkerHandle, WorkerJob};

/// Identifier of a worker within one phase (allocation order)
pub type WorkerId = usize;

/// Cumulative byte count reported by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    pub worker_id: WorkerId,
    pub cumulative_bytes: u64,
    pub timestamp: Instant,
}

/// Network operations a worker or prober performs
///
/// Implementations report transferred bytes through `progress` as they go
/// and should return promptly once `progress.is_stopped()` turns true.
pub trait Transport: Send + Sync + 'static {
    /// Stream one download response to completion
    fn download(&self, url: &str, progress: &TransferProgress) -> Result<()>;

    /// Send `body` as one upload request
    fn upload(&self, url: &str, body: Bytes, progress: &TransferProgress) -> Result<()>;

    /// One round trip against the ping endpoint
    fn ping(&self, url: &str) -> Result<Duration>;
}

/// Append a unique query parameter so no cache can answer the request
pub fn cache_busted(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}t={}", rand::random::<u64>())
}

/// Sleep for `total`, checking `stop` every 50ms.
/// Returns true if the full duration elapsed, false if stopped early.
pub(crate) fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let interval = Duration::from_millis(50);
    let start = Instant::now();
    while start.elapsed() < total {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = total.saturating_sub(start.elapsed());
        std::thread::sleep(remaining.min(interval));
    }
    !stop.load(Ordering::Relaxed)
}
