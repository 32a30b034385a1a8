//! Shared measurement types
//!
//! Pure data types produced by the engine and handed to UI and
//! persistence collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::latency::LatencyStats;

/// Transfer direction of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    /// Lowercase name, as used in thread names and serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => write!(f, "Download"),
            Direction::Upload => write!(f, "Upload"),
        }
    }
}

/// Whether the test was allowed to open more than one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    Single,
    Multi,
}

impl ConnectionMode {
    pub fn from_max_threads(max_threads: usize) -> Self {
        if max_threads <= 1 {
            ConnectionMode::Single
        } else {
            ConnectionMode::Multi
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Single => write!(f, "Single"),
            ConnectionMode::Multi => write!(f, "Multi"),
        }
    }
}

/// Outcome of one directional phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub direction: Direction,
    /// All-time average over the phase, never the smoothed display rate
    pub speed_bits_per_second: f64,
    /// Mean latency observed while the phase was saturating the link
    pub loaded_ping_ms: f64,
    /// Workers running when the phase stopped
    pub workers: usize,
}

impl PhaseResult {
    pub fn speed_mbps(&self) -> f64 {
        self.speed_bits_per_second / 1_000_000.0
    }
}

/// A completed test run: idle latency plus both phases
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub download: PhaseResult,
    pub upload: PhaseResult,
    pub mode: ConnectionMode,
}

impl TestResult {
    pub fn new(
        idle: LatencyStats,
        download: PhaseResult,
        upload: PhaseResult,
        mode: ConnectionMode,
    ) -> Self {
        Self {
            ping_ms: idle.min_ms,
            jitter_ms: idle.jitter_ms,
            download,
            upload,
            mode,
        }
    }
}
