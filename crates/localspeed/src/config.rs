//! Configuration constants for the LocalSpeed engine
//!
//! These are defaults only. Everything that shapes the measurement is
//! carried at runtime by `EngineTuning` and `TestOptions`.

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("LocalSpeed/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;

    /// Per-fragment read size for download bodies (bytes)
    pub const READ_FRAGMENT_SIZE: usize = 64 * 1024;

    /// Timeout for a single latency probe in milliseconds
    pub const PROBE_TIMEOUT_MS: u64 = 2000;
}

/// Companion server endpoints, relative to the server base URL
pub mod endpoints {
    pub const PING: &str = "/api/ping";
    pub const DOWNLOAD: &str = "/static/100MB.bin";
    pub const UPLOAD: &str = "/api/upload";
    pub const HISTORY: &str = "/api/history";
}

/// Worker pool controller defaults
pub mod engine {
    /// Workers started at phase start (1 when max threads is 1)
    pub const INITIAL_WORKERS: usize = 2;

    /// Delay before the scaling state machine leaves warmup
    pub const WARMUP_MS: u64 = 800;

    /// Interval between scaling evaluations
    pub const EVALUATION_INTERVAL_MS: u64 = 400;

    /// Interval between display rate updates
    pub const UI_INTERVAL_MS: u64 = 50;

    /// Display rate is held at zero until this long after phase start
    pub const DISPLAY_DELAY_MS: u64 = 350;

    /// Relative growth of the instant rate that justifies another worker
    pub const MIN_GROWTH: f64 = 0.02;

    /// Below this many workers, a healthy rate always scales up
    pub const FORCE_SCALING_MAX_WORKERS: usize = 4;

    /// Minimal rate (bits/sec) for force-scaling to apply
    pub const FORCE_SCALING_FLOOR_BPS: f64 = 5_000_000.0;

    /// Rates below this (bits/sec) never trigger a scale-down
    pub const NOISE_FLOOR_BPS: f64 = 50_000_000.0;

    /// Consecutive flat evaluations before the pool is considered saturated
    pub const STABLE_EVALUATIONS: u32 = 5;

    /// Per-worker report throttle
    pub const REPORTING_INTERVAL_MS: u64 = 50;

    pub mod download {
        pub const INSTANT_ALPHA: f64 = 0.15;
        pub const DROP_THRESHOLD: f64 = -0.20;
        pub const UI_RISE: f64 = 0.24;
        pub const UI_FALL: f64 = 0.12;
        pub const DROP_LIMIT: f64 = 0.998;
    }

    pub mod upload {
        pub const INSTANT_ALPHA: f64 = 0.10;
        pub const DROP_THRESHOLD: f64 = -0.30;
        pub const UI_RISE: f64 = 0.12;
        pub const UI_FALL: f64 = 0.06;
        pub const DROP_LIMIT: f64 = 0.9995;
    }
}

/// Upload chunk sizing
pub mod chunk {
    /// Requests faster than this double the next chunk
    pub const FAST_REQUEST_MS: u64 = 50;

    pub const DESKTOP_MIN: u64 = 512 * 1024;
    pub const DESKTOP_MAX: u64 = 32 * 1024 * 1024;
    pub const CONSTRAINED_MIN: u64 = 256 * 1024;
    pub const CONSTRAINED_MAX: u64 = 4 * 1024 * 1024;

    /// Concurrency cap for the constrained device profile
    pub const CONSTRAINED_MAX_THREADS: usize = 4;
}

/// Latency probing
pub mod latency {
    /// Sequential probes sent by the idle prober
    pub const IDLE_PROBES: usize = 12;

    /// Leading idle probes discarded (connection setup, cold caches)
    pub const IDLE_WARMUP_PROBES: usize = 2;

    /// Interval between loaded-latency probes
    pub const LOADED_INTERVAL_MS: u64 = 1000;
}

/// Test sequencing
pub mod test {
    pub const DEFAULT_MAX_THREADS: usize = 6;
    pub const DURATION_MS: u64 = 12_000;

    /// Extra time a phase gets before it is declared hung
    pub const PHASE_GRACE_MS: u64 = 1000;

    /// Pause between phases while the display returns to zero
    pub const COOLDOWN_MS: u64 = 1200;

    /// Upper bound for every duration and interval option (one hour)
    pub const MAX_DURATION_MS: u64 = 3_600_000;
}
