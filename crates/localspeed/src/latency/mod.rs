//! Latency probing
//!
//! The idle prober measures ping and jitter before any load is applied.
//! The loaded prober runs next to a transfer phase and reports how much the
//! saturated link degrades round-trip time.

use serde::{Deserialize, Serialize};

pub mod idle;
pub mod loaded;

pub use idle::IdleProber;
pub use loaded::LoadedProbe;

/// Summary of a series of round-trip samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Minimum observed round trip (reported as "ping")
    pub min_ms: f64,
    /// Mean absolute difference between consecutive samples
    pub jitter_ms: f64,
    /// Number of samples the figures were computed from
    pub samples: usize,
}

impl LatencyStats {
    /// Placeholder used when the server could not be probed
    pub fn unknown() -> Self {
        Self {
            min_ms: 0.0,
            jitter_ms: 0.0,
            samples: 0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.samples > 0
    }
}

/// Summarize round-trip samples in milliseconds, in the order observed.
///
/// Jitter is the plain mean of `|s[i] - s[i-1]|`, not a smoothed
/// (RFC 3550 style) estimate, so `[20, 22, 19, 21, 20]` gives 2.0 ms.
pub fn summarize(samples_ms: &[f64]) -> LatencyStats {
    if samples_ms.is_empty() {
        return LatencyStats::unknown();
    }

    let min_ms = samples_ms.iter().copied().fold(f64::INFINITY, f64::min);
    let jitter_ms = if samples_ms.len() < 2 {
        0.0
    } else {
        let deviation: f64 = samples_ms.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        deviation / (samples_ms.len() - 1) as f64
    };

    LatencyStats {
        min_ms,
        jitter_ms,
        samples: samples_ms.len(),
    }
}

/// Arithmetic mean, zero for an empty series
pub fn mean(samples_ms: &[f64]) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }
    samples_ms.iter().sum::<f64>() / samples_ms.len() as f64
}
