//! Companion server history API
//!
//! `POST /api/history` stores a completed result; `GET /api/history`
//! returns a sorted page of stored results. Speeds travel in Mbps.

use localspeed::config::endpoints;
use localspeed::error::SpeedError;
use localspeed::options::join_url;
use localspeed::orchestrator::ResultSink;
use localspeed::types::{ConnectionMode, TestResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::types::Theme;
use crate::error::Result;
use crate::network::client::HttpClient;

/// Body of a save request
#[derive(Debug, Clone, PartialEq, Serialize)]
struct SaveRequest<'a> {
    ping: f64,
    download: f64,
    upload: f64,
    mode: ConnectionMode,
    lang: &'a str,
    theme: Theme,
}

/// A result as the server stores it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub ping: f64,
    pub download: f64,
    pub upload: f64,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    /// Server-local timestamp, `YYYY-MM-DD HH:MM:SS`
    #[serde(default)]
    pub date: Option<String>,
}

/// One page of `GET /api/history`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPage {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub data: Vec<RemoteRecord>,
}

/// Result history kept by the companion server
pub struct RemoteHistory {
    client: HttpClient,
    url: String,
    language: String,
    theme: Theme,
}

impl RemoteHistory {
    pub fn new(server_url: &str, language: &str, theme: Theme) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new()?,
            url: join_url(server_url, endpoints::HISTORY),
            language: language.to_string(),
            theme,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn submit(&self, result: &TestResult) -> Result<()> {
        let body = SaveRequest {
            ping: result.ping_ms,
            download: result.download.speed_mbps(),
            upload: result.upload.speed_mbps(),
            mode: result.mode,
            lang: &self.language,
            theme: self.theme,
        };
        self.client.post_json(&self.url, &body)
    }

    /// The `limit` newest results
    pub fn recent(&self, limit: usize) -> Result<HistoryPage> {
        let url = format!(
            "{}?page=1&limit={}&sort_by=date&order=desc",
            self.url, limit
        );
        self.client.get_json(&url)
    }
}

impl ResultSink for RemoteHistory {
    fn save(&self, result: &TestResult) -> localspeed::error::Result<()> {
        self.submit(result).map_err(SpeedError::from)?;
        info!(url = %self.url, "result saved to server");
        Ok(())
    }
}
