//! HTTP transport
//!
//! Blocking reqwest client shared by all workers of a test. Download bodies
//! are read in fragments so a stop request takes effect between fragments;
//! upload bodies are counted as reqwest pulls them from the arena view.

use std::io::{self, Cursor, Read};
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::blocking::{Body, Client};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use crate::config::network::{
    CONNECT_TIMEOUT_SECS, PROBE_TIMEOUT_MS, READ_FRAGMENT_SIZE, USER_AGENT,
};
use crate::error::Result;

use super::{cache_busted, TransferProgress, Transport};

/// Production transport against a LocalSpeed companion server
pub struct HttpTransport {
    transfer: Client,
    probe: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Transfers run for the whole phase; only connection setup is bounded
        let transfer = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(None::<Duration>)
            .build()?;
        let probe = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_millis(PROBE_TIMEOUT_MS))
            .timeout(Duration::from_millis(PROBE_TIMEOUT_MS))
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self { transfer, probe })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, progress: &TransferProgress) -> Result<()> {
        let mut response = self
            .transfer
            .get(cache_busted(url))
            .header(CACHE_CONTROL, "no-store")
            .send()?
            .error_for_status()?;

        let mut fragment = vec![0u8; READ_FRAGMENT_SIZE];
        loop {
            if progress.is_stopped() {
                return Ok(());
            }
            let n = response.read(&mut fragment)?;
            if n == 0 {
                return Ok(());
            }
            progress.add(n as u64);
        }
    }

    fn upload(&self, url: &str, body: Bytes, progress: &TransferProgress) -> Result<()> {
        let len = body.len() as u64;
        let reader = CountingReader {
            inner: Cursor::new(body),
            progress: progress.clone(),
        };
        self.transfer
            .post(cache_busted(url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CACHE_CONTROL, "no-store")
            .body(Body::sized(reader, len))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn ping(&self, url: &str) -> Result<Duration> {
        let started = Instant::now();
        let response = self
            .probe
            .get(cache_busted(url))
            .header(CACHE_CONTROL, "no-store")
            .send()?
            .error_for_status()?;
        // Drain so the keep-alive connection goes back to the pool
        let _ = response.bytes()?;
        Ok(started.elapsed())
    }
}

/// Upload body reader that counts bytes and aborts once the worker stops
struct CountingReader {
    inner: Cursor<Bytes>,
    progress: TransferProgress,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.progress.is_stopped() {
            return Err(io::Error::other("upload stopped"));
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.progress.add(n as u64);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn progress() -> (
        TransferProgress,
        Arc<AtomicBool>,
        crossbeam_channel::Receiver<crate::transfer::TransferSample>,
    ) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        (
            TransferProgress::new(0, Duration::from_millis(50), tx, stop.clone()),
            stop,
            rx,
        )
    }

    #[test]
    fn client_creation() {
        assert!(HttpTransport::new().is_ok());
    }

    #[test]
    fn counting_reader_counts_everything() {
        let (p, _, _rx) = progress();
        let mut reader = CountingReader {
            inner: Cursor::new(Bytes::from(vec![1u8; 10_000])),
            progress: p.clone(),
        };
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink.len(), 10_000);
        assert_eq!(p.total(), 10_000);
    }

    #[test]
    fn counting_reader_aborts_on_stop() {
        let (p, stop, _rx) = progress();
        let mut reader = CountingReader {
            inner: Cursor::new(Bytes::from(vec![1u8; 10])),
            progress: p,
        };
        stop.store(true, Ordering::Relaxed);
        let mut buf = [0u8; 4];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn ping_invalid_host_fails() {
        let transport = HttpTransport::new().unwrap();
        assert!(transport.ping("http://invalid.invalid.invalid/api/ping").is_err());
    }
}
