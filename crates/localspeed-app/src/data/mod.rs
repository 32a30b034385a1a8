//! Data persistence
//!
//! Settings and the local result history, stored as JSON files.

pub mod history;
pub mod settings;
pub mod storage;
pub mod types;

pub use history::LocalHistory;
pub use settings::Settings;
pub use storage::Store;
pub use types::{HistoryEntry, HistoryMode, SpeedUnit, Theme};
