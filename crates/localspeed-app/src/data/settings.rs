//! Application settings management
//!
//! User preferences plus the test options used for every run. Every field
//! has a default, so a hand-edited file only needs the keys it changes.

use localspeed::options::TestOptions;
use serde::{Deserialize, Serialize};

use crate::config::app::SETTINGS_FILE;
use crate::config::defaults::LANGUAGE;
use crate::data::storage::Store;
use crate::data::types::{HistoryMode, SpeedUnit, Theme};
use crate::error::{AppError, Result};

/// Settings file format version for migrations
const SETTINGS_VERSION: u32 = 1;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Server, thread limit, durations and engine tuning
    #[serde(default)]
    pub test: TestOptions,

    #[serde(default)]
    pub unit: SpeedUnit,

    #[serde(default)]
    pub history: HistoryMode,

    /// Interface language, recorded with each saved result
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub theme: Theme,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_language() -> String {
    LANGUAGE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            test: TestOptions::default(),
            unit: SpeedUnit::default(),
            history: HistoryMode::default(),
            language: default_language(),
            theme: Theme::default(),
        }
    }
}

impl Settings {
    /// Load settings from `store`, falling back to defaults
    pub fn load(store: &Store) -> Result<Self> {
        Ok(store.load::<Settings>(SETTINGS_FILE)?.unwrap_or_default())
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        store.save(SETTINGS_FILE, self)
    }

    /// Options for the next run, validated
    pub fn test_options(&self) -> Result<TestOptions> {
        self.test
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(self.test.clone())
    }
}
