//! LocalSpeed — adaptive multi-stream throughput measurement
//!
//! Idle/loaded latency probing, parallel transfer workers, a feedback
//! controller that scales the worker pool, and a test orchestrator that
//! sequences ping → download → upload.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use localspeed::orchestrator::{NoopSink, SpeedTest};
//! use localspeed::options::TestOptions;
//! use localspeed::transfer::HttpTransport;
//!
//! let options = TestOptions::for_server("http://127.0.0.1:8000");
//! let transport = Arc::new(HttpTransport::new().unwrap());
//! let test = SpeedTest::new(options, transport, Arc::new(NoopSink));
//! let result = test.run().unwrap();
//! println!("{:.1} Mbps down", result.download.speed_mbps());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod latency;
pub mod options;
pub mod orchestrator;
pub mod transfer;
pub mod types;
