//! Network operations
//!
//! HTTP client and the companion server's history API.

pub mod client;
pub mod history;

pub use client::HttpClient;
pub use history::{HistoryPage, RemoteHistory, RemoteRecord};
