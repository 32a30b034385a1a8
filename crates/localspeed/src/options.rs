//! Runtime test options
//!
//! Everything a caller may tune about a test run. Deserializable with
//! per-field defaults so a partial settings file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{chunk, endpoints, engine, latency, test};
use crate::engine::tuning::EngineTuning;
use crate::error::{Result, SpeedError};
use crate::transfer::chunk::ChunkBounds;

/// Hardware class the test runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Desktop,
    /// Phones and small boards: smaller upload buffers, fewer streams
    Constrained,
}

impl DeviceProfile {
    pub fn chunk_bounds(&self) -> ChunkBounds {
        match self {
            DeviceProfile::Desktop => ChunkBounds::new(chunk::DESKTOP_MIN, chunk::DESKTOP_MAX),
            DeviceProfile::Constrained => {
                ChunkBounds::new(chunk::CONSTRAINED_MIN, chunk::CONSTRAINED_MAX)
            }
        }
    }

    /// Upper bound on concurrent workers imposed by the profile
    pub fn thread_cap(&self) -> Option<usize> {
        match self {
            DeviceProfile::Desktop => None,
            DeviceProfile::Constrained => Some(chunk::CONSTRAINED_MAX_THREADS),
        }
    }
}

/// Paths of the companion server endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub ping: String,
    pub download: String,
    pub upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ping: endpoints::PING.to_string(),
            download: endpoints::DOWNLOAD.to_string(),
            upload: endpoints::UPLOAD.to_string(),
        }
    }
}

/// Options for one speed test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    pub server_url: String,
    pub endpoints: Endpoints,
    /// 1 disables pool scaling entirely
    pub max_threads: usize,
    pub test_duration_ms: u64,
    pub device_profile: DeviceProfile,
    pub reporting_interval_ms: u64,
    pub phase_grace_ms: u64,
    pub cooldown_ms: u64,
    pub idle_probes: usize,
    pub idle_warmup_probes: usize,
    pub loaded_probe_interval_ms: u64,
    pub tuning: EngineTuning,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            endpoints: Endpoints::default(),
            max_threads: test::DEFAULT_MAX_THREADS,
            test_duration_ms: test::DURATION_MS,
            device_profile: DeviceProfile::default(),
            reporting_interval_ms: engine::REPORTING_INTERVAL_MS,
            phase_grace_ms: test::PHASE_GRACE_MS,
            cooldown_ms: test::COOLDOWN_MS,
            idle_probes: latency::IDLE_PROBES,
            idle_warmup_probes: latency::IDLE_WARMUP_PROBES,
            loaded_probe_interval_ms: latency::LOADED_INTERVAL_MS,
            tuning: EngineTuning::default(),
        }
    }
}

impl TestOptions {
    /// Default options pointed at the given server
    pub fn for_server(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            ..Self::default()
        }
    }

    /// Reject option sets the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(SpeedError::Config("max_threads must be at least 1".to_string()));
        }
        if self.test_duration_ms == 0 {
            return Err(SpeedError::Config("test_duration_ms must be positive".to_string()));
        }
        if self.reporting_interval_ms == 0 {
            return Err(SpeedError::Config(
                "reporting_interval_ms must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("test_duration_ms", self.test_duration_ms),
            ("phase_grace_ms", self.phase_grace_ms),
            ("cooldown_ms", self.cooldown_ms),
            ("reporting_interval_ms", self.reporting_interval_ms),
            ("loaded_probe_interval_ms", self.loaded_probe_interval_ms),
        ] {
            check_duration(name, value)?;
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(SpeedError::Config(format!(
                "server URL must start with http:// or https://, got {:?}",
                self.server_url
            )));
        }
        self.tuning.validate()
    }

    /// Thread limit after applying the device profile cap
    pub fn effective_max_threads(&self) -> usize {
        let requested = self.max_threads.max(1);
        match self.device_profile.thread_cap() {
            Some(cap) => requested.min(cap),
            None => requested,
        }
    }

    pub fn ping_url(&self) -> String {
        join_url(&self.server_url, &self.endpoints.ping)
    }

    pub fn download_url(&self) -> String {
        join_url(&self.server_url, &self.endpoints.download)
    }

    pub fn upload_url(&self) -> String {
        join_url(&self.server_url, &self.endpoints.upload)
    }

    pub fn test_duration(&self) -> Duration {
        Duration::from_millis(self.test_duration_ms)
    }

    /// Hard limit after which a phase is considered hung
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_millis(self.test_duration_ms.saturating_add(self.phase_grace_ms))
    }

    pub fn reporting_interval(&self) -> Duration {
        Duration::from_millis(self.reporting_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn loaded_probe_interval(&self) -> Duration {
        Duration::from_millis(self.loaded_probe_interval_ms)
    }
}

/// Reject durations longer than `test::MAX_DURATION_MS`
pub(crate) fn check_duration(name: &str, value_ms: u64) -> Result<()> {
    if value_ms > test::MAX_DURATION_MS {
        return Err(SpeedError::Config(format!(
            "{name} must be at most {} ms, got {value_ms}",
            test::MAX_DURATION_MS
        )));
    }
    Ok(())
}

/// Join a base URL and an absolute path without doubling the slash
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
