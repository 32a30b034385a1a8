//! Controller tuning
//!
//! All numeric knobs of the scaling and smoothing loop. Defaults come from
//! `config::engine`; tests swap in synthetic values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::engine;
use crate::error::{Result, SpeedError};
use crate::options::check_duration;
use crate::types::Direction;

/// Knobs that differ between download and upload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionTuning {
    /// EMA factor for the delta-based rate that drives scaling
    pub instant_alpha: f64,
    /// Relative growth below which a crash is declared (negative)
    pub drop_threshold: f64,
    /// Display EMA factor while the average is above the display
    pub ui_rise: f64,
    /// Display EMA factor while the average is below the display
    pub ui_fall: f64,
    /// Per-tick floor: display never drops below `previous * drop_limit`
    pub drop_limit: f64,
}

impl DirectionTuning {
    pub fn download() -> Self {
        Self {
            instant_alpha: engine::download::INSTANT_ALPHA,
            drop_threshold: engine::download::DROP_THRESHOLD,
            ui_rise: engine::download::UI_RISE,
            ui_fall: engine::download::UI_FALL,
            drop_limit: engine::download::DROP_LIMIT,
        }
    }

    pub fn upload() -> Self {
        Self {
            instant_alpha: engine::upload::INSTANT_ALPHA,
            drop_threshold: engine::upload::DROP_THRESHOLD,
            ui_rise: engine::upload::UI_RISE,
            ui_fall: engine::upload::UI_FALL,
            drop_limit: engine::upload::DROP_LIMIT,
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        if !in_unit(self.instant_alpha) || !in_unit(self.ui_rise) || !in_unit(self.ui_fall) {
            return Err(SpeedError::Config(format!(
                "{label}: smoothing factors must be in (0, 1]"
            )));
        }
        if !in_unit(self.drop_limit) {
            return Err(SpeedError::Config(format!("{label}: drop_limit must be in (0, 1]")));
        }
        if self.drop_threshold >= 0.0 {
            return Err(SpeedError::Config(format!(
                "{label}: drop_threshold must be negative"
            )));
        }
        Ok(())
    }
}

/// Scaling and smoothing parameters of the worker pool controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    pub initial_workers: usize,
    pub warmup_ms: u64,
    pub evaluation_interval_ms: u64,
    pub ui_interval_ms: u64,
    pub display_delay_ms: u64,
    pub min_growth: f64,
    pub force_scaling_max_workers: usize,
    pub force_scaling_floor_bps: f64,
    pub noise_floor_bps: f64,
    pub stable_evaluations: u32,
    pub download: DirectionTuning,
    pub upload: DirectionTuning,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            initial_workers: engine::INITIAL_WORKERS,
            warmup_ms: engine::WARMUP_MS,
            evaluation_interval_ms: engine::EVALUATION_INTERVAL_MS,
            ui_interval_ms: engine::UI_INTERVAL_MS,
            display_delay_ms: engine::DISPLAY_DELAY_MS,
            min_growth: engine::MIN_GROWTH,
            force_scaling_max_workers: engine::FORCE_SCALING_MAX_WORKERS,
            force_scaling_floor_bps: engine::FORCE_SCALING_FLOOR_BPS,
            noise_floor_bps: engine::NOISE_FLOOR_BPS,
            stable_evaluations: engine::STABLE_EVALUATIONS,
            download: DirectionTuning::download(),
            upload: DirectionTuning::upload(),
        }
    }
}

impl EngineTuning {
    pub fn for_direction(&self, direction: Direction) -> DirectionTuning {
        match direction {
            Direction::Download => self.download,
            Direction::Upload => self.upload,
        }
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    pub fn ui_interval(&self) -> Duration {
        Duration::from_millis(self.ui_interval_ms)
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_workers == 0 {
            return Err(SpeedError::Config("initial_workers must be at least 1".to_string()));
        }
        if self.evaluation_interval_ms == 0 || self.ui_interval_ms == 0 {
            return Err(SpeedError::Config("tick intervals must be positive".to_string()));
        }
        for (name, value) in [
            ("warmup_ms", self.warmup_ms),
            ("evaluation_interval_ms", self.evaluation_interval_ms),
            ("ui_interval_ms", self.ui_interval_ms),
            ("display_delay_ms", self.display_delay_ms),
        ] {
            check_duration(name, value)?;
        }
        if self.stable_evaluations == 0 {
            return Err(SpeedError::Config("stable_evaluations must be positive".to_string()));
        }
        self.download.validate("download")?;
        self.upload.validate("upload")
    }
}
