//! App-level data types

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use localspeed::types::{ConnectionMode, TestResult};
use serde::{Deserialize, Serialize};

/// Unit speeds are shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    /// Megabits per second
    #[default]
    #[serde(rename = "mbps")]
    Mbps,
    /// Megabytes per second
    #[serde(rename = "mbs")]
    MegabytesPerSecond,
}

impl SpeedUnit {
    pub fn label(&self) -> &'static str {
        match self {
            SpeedUnit::Mbps => "Mbps",
            SpeedUnit::MegabytesPerSecond => "MB/s",
        }
    }

    /// Convert a rate in bits/sec to this unit
    pub fn convert(&self, bits_per_second: f64) -> f64 {
        let mbps = bits_per_second / 1_000_000.0;
        match self {
            SpeedUnit::Mbps => mbps,
            SpeedUnit::MegabytesPerSecond => mbps / 8.0,
        }
    }

    /// e.g. "94.3 Mbps"
    pub fn format(&self, bits_per_second: f64) -> String {
        format!("{:.1} {}", self.convert(bits_per_second), self.label())
    }
}

impl FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mbps" => Ok(SpeedUnit::Mbps),
            "mbs" | "mb/s" => Ok(SpeedUnit::MegabytesPerSecond),
            other => Err(format!("unknown unit {other:?} (expected mbps or mbs)")),
        }
    }
}

/// Theme preference, sent along with saved results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

/// Where completed results are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// POST to the companion server's history API
    #[default]
    Remote,
    /// Append to `history.json` in the config directory
    Local,
    None,
}

impl FromStr for HistoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(HistoryMode::Remote),
            "local" => Ok(HistoryMode::Local),
            "none" => Ok(HistoryMode::None),
            other => Err(format!(
                "unknown history mode {other:?} (expected remote, local or none)"
            )),
        }
    }
}

/// One recorded test, as kept in the local history file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    #[serde(default)]
    pub download_loaded_ping_ms: f64,
    #[serde(default)]
    pub upload_loaded_ping_ms: f64,
    pub mode: ConnectionMode,
}

impl HistoryEntry {
    pub fn from_result(result: &TestResult) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp,
            ping_ms: result.ping_ms,
            jitter_ms: result.jitter_ms,
            download_mbps: result.download.speed_mbps(),
            upload_mbps: result.upload.speed_mbps(),
            download_loaded_ping_ms: result.download.loaded_ping_ms,
            upload_loaded_ping_ms: result.upload.loaded_ping_ms,
            mode: result.mode,
        }
    }
}
