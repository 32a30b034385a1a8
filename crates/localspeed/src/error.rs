//! Error types for LocalSpeed
//!
//! Centralized error handling using thiserror. Only phase timeouts,
//! persistence failures and setup errors ever reach the orchestrator;
//! per-request transfer errors stay inside the workers.

use thiserror::Error;

use crate::types::Direction;

/// Main error type for the LocalSpeed engine
#[derive(Error, Debug)]
pub enum SpeedError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} phase exceeded its time limit")]
    PhaseTimeout(Direction),

    #[error("A speed test is already running")]
    Busy,

    #[error("Test cancelled")]
    Cancelled,

    #[error("Failed to save result: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start {0}")]
    Spawn(String),
}

/// Result type alias for LocalSpeed
pub type Result<T> = std::result::Result<T, SpeedError>;

impl SpeedError {
    /// Short notification text for the user, without internal detail
    pub fn user_message(&self) -> &'static str {
        match self {
            SpeedError::PhaseTimeout(_) | SpeedError::Cancelled => "Test interrupted",
            SpeedError::Network(_) | SpeedError::Io(_) => "Connection error",
            SpeedError::Busy => "A test is already in progress",
            SpeedError::Persistence(_) => "Could not save the test result",
            SpeedError::Config(_) => "Invalid configuration",
            SpeedError::Spawn(_) => "Test could not be started",
        }
    }
}

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_status() {
        if let Some(status) = e.status() {
            return format!("Server responded with HTTP {status}");
        }
    }
    format!("Network error: {e}")
}
