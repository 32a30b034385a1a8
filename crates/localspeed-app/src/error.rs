//! Error types for LocalSpeed app services
//!
//! Application-level errors that wrap engine errors and add app-specific variants.

use localspeed::error::SpeedError;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] SpeedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Server rejected the request: {0}")]
    Server(String),
}

impl AppError {
    /// Short notification text for the user
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Engine(e) => e.user_message(),
            AppError::Config(_) => "Invalid configuration",
            AppError::Storage(_) | AppError::Server(_) => "Could not save the test result",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Engine(SpeedError::Network(e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Engine(SpeedError::Io(e))
    }
}

/// Result sinks report any app failure as a persistence failure
impl From<AppError> for SpeedError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Engine(SpeedError::Persistence(msg)) => SpeedError::Persistence(msg),
            other => SpeedError::Persistence(other.to_string()),
        }
    }
}

/// Result type alias for LocalSpeed app services
pub type Result<T> = std::result::Result<T, AppError>;
