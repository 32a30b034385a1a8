//! LocalSpeed App Services
//!
//! Settings, result history (companion server and local file), and
//! networking utilities. Depends on the `localspeed` engine crate.

pub mod config;
pub mod data;
pub mod error;
pub mod network;
