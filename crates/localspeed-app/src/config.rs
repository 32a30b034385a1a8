//! Configuration constants for LocalSpeed app services

/// Application metadata
pub mod app {
    /// Application name (used for config directory, etc.)
    pub const NAME: &str = "localspeed";

    /// Settings file in the config directory
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Local result history file in the config directory
    pub const HISTORY_FILE: &str = "history.json";
}

/// Defaults mirrored from the companion server's settings table
pub mod defaults {
    pub const LANGUAGE: &str = "pl";
}

/// Result history
pub mod history {
    /// Oldest local entries are dropped beyond this many
    pub const MAX_LOCAL_ENTRIES: usize = 500;

    /// Request timeout for the history API in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 10;
}
