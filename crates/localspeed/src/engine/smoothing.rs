//! Rate smoothing
//!
//! `InstantRate` turns cumulative byte totals into an exponentially smoothed
//! delta rate that drives scaling. `DisplayRate` smooths the all-time
//! average for display: quick to rise, slow to fall, and never falling
//! faster than a fixed fraction per tick.

use std::time::{Duration, Instant};

/// EMA of the byte-delta rate between consecutive updates (bits/sec)
#[derive(Debug, Clone)]
pub struct InstantRate {
    alpha: f64,
    ema: f64,
    last_total: u64,
    last_at: Instant,
}

impl InstantRate {
    pub fn new(alpha: f64, started: Instant) -> Self {
        Self {
            alpha,
            ema: 0.0,
            last_total: 0,
            last_at: started,
        }
    }

    /// Feed the current cumulative total. Returns the smoothed rate.
    pub fn update(&mut self, total_bytes: u64, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_at).as_secs_f64();
        if dt <= 0.0 {
            return self.ema;
        }

        let delta = total_bytes.saturating_sub(self.last_total);
        let sample = delta as f64 * 8.0 / dt;
        // Seed with the first real sample instead of ramping up from zero
        if self.ema == 0.0 {
            self.ema = sample;
        } else {
            self.ema = self.alpha * sample + (1.0 - self.alpha) * self.ema;
        }

        self.last_total = total_bytes.max(self.last_total);
        self.last_at = now;
        self.ema
    }

    pub fn value(&self) -> f64 {
        self.ema
    }
}

/// Display rate smoothed from the all-time average (bits/sec)
#[derive(Debug, Clone)]
pub struct DisplayRate {
    rise: f64,
    fall: f64,
    drop_limit: f64,
    delay: Duration,
    value: f64,
}

impl DisplayRate {
    pub fn new(rise: f64, fall: f64, drop_limit: f64, delay: Duration) -> Self {
        Self {
            rise,
            fall,
            drop_limit,
            delay,
            value: 0.0,
        }
    }

    /// One display tick. Held at zero until `delay` has elapsed.
    pub fn update(&mut self, average: f64, elapsed: Duration) -> f64 {
        if elapsed < self.delay {
            self.value = 0.0;
            return self.value;
        }

        let factor = if average > self.value {
            self.rise
        } else {
            self.fall
        };
        let next = self.value + factor * (average - self.value);
        self.value = next.max(self.value * self.drop_limit);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Return to zero between phases
    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
