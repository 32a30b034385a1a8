//! Worker pool scaling policy
//!
//! Pure-logic state machine deciding whether the pool should grow, shrink
//! or hold, from the smoothed instantaneous rate sampled on each evaluation
//! tick. No threads or clocks: callers pass elapsed time in.
//!
//! Growth is measured against the previous evaluation. Drops are measured
//! against the best rate seen since the pool last grew, so a crash that the
//! smoothing spreads over several evaluations still adds up to one drop.

use std::time::Duration;

use super::tuning::{DirectionTuning, EngineTuning};

/// Scaling state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingStatus {
    /// Initial workers are establishing throughput
    Warmup,
    /// Probing for the saturation point
    Scaling,
    /// Terminal: the pool is left as it is until the phase ends
    Sustain,
}

/// What the policy wants done with the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    Grow,
    Shrink,
    Hold,
}

/// Growth-probing scaling policy
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    status: ScalingStatus,
    max_threads: usize,
    initial_workers: usize,
    warmup: Duration,
    min_growth: f64,
    drop_threshold: f64,
    force_scaling_max_workers: usize,
    force_scaling_floor_bps: f64,
    noise_floor_bps: f64,
    stable_evaluations: u32,
    stable_count: u32,
    previous_rate: f64,
    /// Highest rate since warmup ended or the pool last grew
    reference_rate: f64,
}

impl ScalingPolicy {
    pub fn new(tuning: &EngineTuning, direction: DirectionTuning, max_threads: usize) -> Self {
        let max_threads = max_threads.max(1);
        let (status, initial_workers) = if max_threads == 1 {
            (ScalingStatus::Sustain, 1)
        } else {
            (
                ScalingStatus::Warmup,
                tuning.initial_workers.clamp(1, max_threads),
            )
        };
        Self {
            status,
            max_threads,
            initial_workers,
            warmup: tuning.warmup(),
            min_growth: tuning.min_growth,
            drop_threshold: direction.drop_threshold,
            force_scaling_max_workers: tuning.force_scaling_max_workers,
            force_scaling_floor_bps: tuning.force_scaling_floor_bps,
            noise_floor_bps: tuning.noise_floor_bps,
            stable_evaluations: tuning.stable_evaluations,
            stable_count: 0,
            previous_rate: 0.0,
            reference_rate: 0.0,
        }
    }

    /// Workers to start the phase with
    pub fn initial_workers(&self) -> usize {
        self.initial_workers
    }

    pub fn status(&self) -> ScalingStatus {
        self.status
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// One evaluation tick. `instant_rate` is in bits/sec, `active` is the
    /// current pool size.
    pub fn evaluate(&mut self, elapsed: Duration, instant_rate: f64, active: usize) -> ScalingAction {
        match self.status {
            ScalingStatus::Warmup => {
                if elapsed >= self.warmup {
                    self.previous_rate = instant_rate;
                    self.reference_rate = instant_rate;
                    self.status = ScalingStatus::Scaling;
                }
                ScalingAction::Hold
            }
            ScalingStatus::Scaling => self.probe(instant_rate, active),
            ScalingStatus::Sustain => ScalingAction::Hold,
        }
    }

    fn probe(&mut self, rate: f64, active: usize) -> ScalingAction {
        let growth = relative_change(rate, self.previous_rate);
        let drop = relative_change(rate, self.reference_rate);
        self.previous_rate = rate;

        let crashing = drop < self.drop_threshold;
        // Fast local links can look flat with only the initial workers
        let force = !crashing
            && active < self.force_scaling_max_workers
            && rate > self.force_scaling_floor_bps;

        if growth > self.min_growth || force {
            if active < self.max_threads {
                self.stable_count = 0;
                self.reference_rate = rate;
                return ScalingAction::Grow;
            }
            self.status = ScalingStatus::Sustain;
            return ScalingAction::Hold;
        }

        if crashing && rate > self.noise_floor_bps {
            self.status = ScalingStatus::Sustain;
            if active > 1 {
                return ScalingAction::Shrink;
            }
            return ScalingAction::Hold;
        }

        self.reference_rate = self.reference_rate.max(rate);
        // A rate still sliding down is not a plateau yet
        if growth >= -self.min_growth {
            self.stable_count += 1;
        }
        if self.stable_count >= self.stable_evaluations {
            self.status = ScalingStatus::Sustain;
        }
        ScalingAction::Hold
    }
}

fn relative_change(rate: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        (rate - baseline) / baseline
    } else {
        0.0
    }
}
