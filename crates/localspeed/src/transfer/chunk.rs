//! Upload chunk sizing
//!
//! Upload requests start small so the display moves immediately, then double
//! while requests finish faster than `FAST_REQUEST_MS`, amortizing per-request
//! overhead on fast links. All request bodies are views into one arena
//! allocated per phase.

use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;

use crate::config::chunk::FAST_REQUEST_MS;

/// Inclusive size bounds for upload request bodies (bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub min: u64,
    pub max: u64,
}

impl ChunkBounds {
    /// Bounds are normalized so that `min <= max` always holds
    pub fn new(min: u64, max: u64) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn clamp(&self, size: u64) -> u64 {
        size.clamp(self.min, self.max)
    }
}

/// Next request size given how long the previous request took
pub fn next_chunk_size(request_duration_ms: u64, current: u64, min: u64, max: u64) -> u64 {
    let bounds = ChunkBounds::new(min, max);
    let proposed = if request_duration_ms < FAST_REQUEST_MS {
        current.saturating_mul(2)
    } else {
        current
    };
    bounds.clamp(proposed)
}

/// Per-worker chunk size state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizeState {
    current: u64,
    bounds: ChunkBounds,
}

impl ChunkSizeState {
    /// Start at the lower bound
    pub fn new(bounds: ChunkBounds) -> Self {
        Self {
            current: bounds.min,
            bounds,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn bounds(&self) -> ChunkBounds {
        self.bounds
    }

    /// Feed the wall-clock duration of the request that just completed
    pub fn observe(&mut self, request_duration: Duration) -> u64 {
        let ms = u64::try_from(request_duration.as_millis()).unwrap_or(u64::MAX);
        self.current = next_chunk_size(ms, self.current, self.bounds.min, self.bounds.max);
        self.current
    }
}

/// One random-filled upload buffer shared by every upload worker of a phase
#[derive(Debug, Clone)]
pub struct UploadArena {
    data: Bytes,
}

impl UploadArena {
    /// Allocate `bounds.max` bytes of incompressible payload
    pub fn allocate(bounds: ChunkBounds) -> Self {
        let len = usize::try_from(bounds.max).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        Self { data: Bytes::from(buf) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A zero-copy view of the first `size` bytes (capped at the arena size)
    pub fn view(&self, size: u64) -> Bytes {
        let len = usize::try_from(size).unwrap_or(usize::MAX).min(self.data.len());
        self.data.slice(..len)
    }
}
