//! Shared HTTP client wrapper
//!
//! Thin wrapper around `reqwest::blocking::Client` for the small JSON
//! requests the app makes. Measurement traffic goes through the engine's
//! own transport, never through this client.

use std::time::Duration;

use localspeed::config::network::{CONNECT_TIMEOUT_SECS, USER_AGENT};
use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::history::REQUEST_TIMEOUT_SECS;
use crate::error::{AppError, Result};

/// Shared HTTP client with standard configuration
pub struct HttpClient {
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { inner })
    }

    /// GET a URL and deserialize the JSON response
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = check_status(self.inner.get(url).send()?)?;
        Ok(resp.json::<T>()?)
    }

    /// POST `body` as JSON. The response body is ignored.
    pub fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        check_status(self.inner.post(url).json(body).send()?)?;
        Ok(())
    }

    /// Access the underlying reqwest client
    pub fn inner(&self) -> &reqwest::blocking::Client {
        &self.inner
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(AppError::Server(format!("{} returned HTTP {}", resp.url(), status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_get_json_invalid_url() {
        let client = HttpClient::new().unwrap();
        let result: Result<serde_json::Value> = client.get_json("http://invalid.invalid.invalid");
        assert!(result.is_err());
    }

    #[test]
    fn test_post_json_invalid_url() {
        let client = HttpClient::new().unwrap();
        let result = client.post_json("http://invalid.invalid.invalid", &serde_json::json!({}));
        assert!(matches!(result, Err(AppError::Engine(_))));
    }
}
