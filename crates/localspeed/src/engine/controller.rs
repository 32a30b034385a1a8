//! Worker pool controller state
//!
//! `PoolController` owns everything a phase mutates: the ordered set of
//! active worker ids, the per-worker byte map, both smoothed rates and the
//! scaling policy. It has no threads and no clock of its own; the phase
//! runner feeds it samples and drives its UI and evaluation ticks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::transfer::{TransferSample, WorkerId};
use crate::types::Direction;

use super::scaling::{ScalingAction, ScalingPolicy, ScalingStatus};
use super::smoothing::{DisplayRate, InstantRate};
use super::tuning::EngineTuning;

/// One display tick worth of rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedUpdate {
    pub direction: Direction,
    /// Smoothed display rate (bits/sec)
    pub ui_rate_bps: f64,
    /// All-time average (bits/sec)
    pub average_bps: f64,
    pub elapsed_secs: f64,
    pub active_workers: usize,
}

/// What the runner must do after an evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Spawn a worker with this id
    Add(WorkerId),
    /// Stop the worker with this id
    Remove(WorkerId),
    Hold,
}

/// Final figures of a stopped phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpeed {
    /// All-time average at the moment of stop, never the display rate
    pub bits_per_second: f64,
    /// Workers active when the phase stopped
    pub workers: usize,
    pub elapsed: Duration,
}

/// Per-phase controller state
pub struct PoolController {
    direction: Direction,
    started: Instant,
    policy: ScalingPolicy,
    instant: InstantRate,
    display: DisplayRate,
    /// Insertion order is scale-up order; scale-down pops from the back
    active: Vec<WorkerId>,
    next_id: WorkerId,
    per_worker_bytes: HashMap<WorkerId, u64>,
    max_bytes_seen: u64,
    peak_workers: usize,
    finished: bool,
}

impl PoolController {
    pub fn new(
        direction: Direction,
        tuning: &EngineTuning,
        max_threads: usize,
        started: Instant,
    ) -> Self {
        let table = tuning.for_direction(direction);
        Self {
            direction,
            started,
            policy: ScalingPolicy::new(tuning, table, max_threads),
            instant: InstantRate::new(table.instant_alpha, started),
            display: DisplayRate::new(
                table.ui_rise,
                table.ui_fall,
                table.drop_limit,
                tuning.display_delay(),
            ),
            active: Vec::new(),
            next_id: 0,
            per_worker_bytes: HashMap::new(),
            max_bytes_seen: 0,
            peak_workers: 0,
            finished: false,
        }
    }

    /// Allocate the initial worker ids. Only the first call allocates.
    pub fn start(&mut self) -> Vec<WorkerId> {
        if self.finished || self.next_id > 0 {
            return Vec::new();
        }
        (0..self.policy.initial_workers())
            .map(|_| self.allocate())
            .collect()
    }

    fn allocate(&mut self) -> WorkerId {
        let id = self.next_id;
        self.next_id += 1;
        self.active.push(id);
        self.peak_workers = self.peak_workers.max(self.active.len());
        id
    }

    /// Fold one worker report in. Stale or out-of-order reports never lower
    /// the recorded count.
    pub fn record_sample(&mut self, sample: &TransferSample) {
        if self.finished {
            return;
        }
        let recorded = self.per_worker_bytes.entry(sample.worker_id).or_insert(0);
        *recorded = (*recorded).max(sample.cumulative_bytes);
    }

    /// Recorded bytes for one worker
    pub fn worker_bytes(&self, id: WorkerId) -> u64 {
        self.per_worker_bytes.get(&id).copied().unwrap_or(0)
    }

    /// Bytes across all workers, including removed ones. Never regresses.
    pub fn total_bytes(&mut self) -> u64 {
        let sum: u64 = self.per_worker_bytes.values().sum();
        self.max_bytes_seen = self.max_bytes_seen.max(sum);
        self.max_bytes_seen
    }

    /// All-time average rate in bits/sec
    pub fn average_rate(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 * 8.0 / elapsed
    }

    /// Display tick: advances both smoothed rates
    pub fn ui_tick(&mut self, now: Instant) -> SpeedUpdate {
        let elapsed = now.saturating_duration_since(self.started);
        let total = self.total_bytes();
        let average = self.average_rate(now);
        self.instant.update(total, now);
        let ui_rate = self.display.update(average, elapsed);

        // While probing, the average must not read below what is on screen
        let average_bps = if self.policy.status() == ScalingStatus::Scaling {
            average.max(ui_rate)
        } else {
            average
        };

        SpeedUpdate {
            direction: self.direction,
            ui_rate_bps: ui_rate,
            average_bps,
            elapsed_secs: elapsed.as_secs_f64(),
            active_workers: self.active.len(),
        }
    }

    /// Evaluation tick: consult the scaling policy and apply its verdict to
    /// the active set
    pub fn evaluate(&mut self, now: Instant) -> ScalingDecision {
        if self.finished {
            return ScalingDecision::Hold;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let before = self.policy.status();
        let rate = self.instant.value();
        let action = self.policy.evaluate(elapsed, rate, self.active.len());

        let decision = match action {
            ScalingAction::Grow if self.active.len() < self.policy.max_threads() => {
                ScalingDecision::Add(self.allocate())
            }
            ScalingAction::Shrink if self.active.len() > 1 => match self.active.pop() {
                Some(id) => ScalingDecision::Remove(id),
                None => ScalingDecision::Hold,
            },
            _ => ScalingDecision::Hold,
        };

        let after = self.policy.status();
        if before != after {
            info!(
                direction = %self.direction,
                from = ?before,
                to = ?after,
                workers = self.active.len(),
                rate_mbps = rate / 1_000_000.0,
                "scaling state changed"
            );
        }
        match decision {
            ScalingDecision::Add(id) => debug!(worker = id, workers = self.active.len(), "adding worker"),
            ScalingDecision::Remove(id) => {
                debug!(worker = id, workers = self.active.len(), "removing worker")
            }
            ScalingDecision::Hold => {}
        }
        decision
    }

    /// A worker could not be started; forget it
    pub fn worker_failed(&mut self, id: WorkerId) {
        self.active.retain(|w| *w != id);
    }

    pub fn status(&self) -> ScalingStatus {
        self.policy.status()
    }

    /// Active worker ids, oldest first
    pub fn active_workers(&self) -> &[WorkerId] {
        &self.active
    }

    /// Largest pool size reached so far
    pub fn peak_workers(&self) -> usize {
        self.peak_workers
    }

    pub fn instant_rate(&self) -> f64 {
        self.instant.value()
    }

    pub fn ui_rate(&self) -> f64 {
        self.display.value()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop the phase: report the average at `now` and clear all state.
    /// Returns `None` if the phase was already finished.
    pub fn finish(&mut self, now: Instant) -> Option<PhaseSpeed> {
        if self.finished {
            return None;
        }
        let bits_per_second = self.average_rate(now);
        let speed = PhaseSpeed {
            bits_per_second,
            workers: self.active.len(),
            elapsed: now.saturating_duration_since(self.started),
        };

        self.finished = true;
        self.active.clear();
        self.per_worker_bytes.clear();
        self.display.reset();
        Some(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP_MS: u64 = 50;
    const EVAL_MS: u64 = 400;

    fn sample(worker_id: WorkerId, cumulative_bytes: u64, timestamp: Instant) -> TransferSample {
        TransferSample {
            worker_id,
            cumulative_bytes,
            timestamp,
        }
    }

    struct Run {
        controller: PoolController,
        decisions: Vec<(u64, ScalingDecision)>,
        pool_sizes: Vec<usize>,
        last_update: Option<SpeedUpdate>,
        t0: Instant,
    }

    fn simulate(
        max_threads: usize,
        duration_ms: u64,
        aggregate_bps: impl Fn(u64, usize) -> f64,
    ) -> Run {
        simulate_direction(Direction::Download, max_threads, duration_ms, aggregate_bps)
    }

    /// Drive a controller against a synthetic link. `aggregate_bps` maps
    /// (elapsed ms, active workers) to the link's total rate, shared evenly.
    fn simulate_direction(
        direction: Direction,
        max_threads: usize,
        duration_ms: u64,
        aggregate_bps: impl Fn(u64, usize) -> f64,
    ) -> Run {
        let t0 = Instant::now();
        let mut controller =
            PoolController::new(direction, &EngineTuning::default(), max_threads, t0);
        let mut workers: Vec<WorkerId> = controller.start();
        let mut bytes: HashMap<WorkerId, u64> = HashMap::new();
        let mut decisions = Vec::new();
        let mut pool_sizes = Vec::new();
        let mut last_update = None;

        for step in 1..=duration_ms / STEP_MS {
            let t = step * STEP_MS;
            let now = t0 + Duration::from_millis(t);
            let share = aggregate_bps(t, workers.len()) / workers.len() as f64;
            for id in &workers {
                let count = bytes.entry(*id).or_insert(0);
                *count += (share * STEP_MS as f64 / 1000.0 / 8.0) as u64;
                controller.record_sample(&sample(*id, *count, now));
            }
            last_update = Some(controller.ui_tick(now));
            if t % EVAL_MS == 0 {
                let decision = controller.evaluate(now);
                match decision {
                    ScalingDecision::Add(id) => workers.push(id),
                    ScalingDecision::Remove(id) => workers.retain(|w| *w != id),
                    ScalingDecision::Hold => {}
                }
                if decision != ScalingDecision::Hold {
                    decisions.push((t, decision));
                }
            }
            assert_eq!(workers.as_slice(), controller.active_workers());
            pool_sizes.push(workers.len());
        }

        Run {
            controller,
            decisions,
            pool_sizes,
            last_update,
            t0,
        }
    }

    #[test]
    fn linear_link_scales_to_max_then_sustains() {
        let mut run = simulate(4, 10_000, |_, n| n as f64 * 100e6);

        assert_eq!(
            run.decisions,
            vec![
                (1200, ScalingDecision::Add(2)),
                (1600, ScalingDecision::Add(3)),
            ]
        );
        assert_eq!(run.controller.status(), ScalingStatus::Sustain);
        assert!(run.pool_sizes.iter().all(|n| *n <= 4));

        let end = run.t0 + Duration::from_millis(10_000);
        let speed = run.controller.finish(end).unwrap();
        assert_eq!(speed.workers, 4);
        // 400 Mbps once saturated, diluted by the ramp-up
        assert!(
            speed.bits_per_second > 350e6 && speed.bits_per_second < 400e6,
            "speed {}",
            speed.bits_per_second
        );
    }

    #[test]
    fn single_thread_never_scales() {
        let run = simulate(1, 10_000, |_, n| n as f64 * 100e6);
        assert!(run.decisions.is_empty());
        assert!(run.pool_sizes.iter().all(|n| *n == 1));
        assert_eq!(run.controller.status(), ScalingStatus::Sustain);
        assert_eq!(run.controller.active_workers(), &[0]);
    }

    #[test]
    fn crash_removes_newest_worker_once() {
        // Link saturates at 400 Mbps and loses 40% at 3.25s
        let run = simulate(8, 10_000, |t, n| {
            let rate = (n as f64 * 100e6).min(400e6);
            if t >= 3250 {
                rate * 0.6
            } else {
                rate
            }
        });

        let removals: Vec<_> = run
            .decisions
            .iter()
            .filter(|(_, d)| matches!(d, ScalingDecision::Remove(_)))
            .collect();
        assert_eq!(removals.len(), 1);
        let (removed_at, removed) = *removals[0];
        assert_eq!(removed, ScalingDecision::Remove(5));
        assert!(run
            .decisions
            .iter()
            .all(|(t, d)| *t <= removed_at || !matches!(d, ScalingDecision::Add(_))));
        assert_eq!(run.controller.status(), ScalingStatus::Sustain);
        assert_eq!(run.controller.active_workers(), &[0, 1, 2, 3, 4]);
        assert_eq!(run.controller.peak_workers(), 6);
    }

    #[test]
    fn upload_crash_removes_newest_worker_once() {
        // Same link as above; upload smoothing spreads the 40% loss over
        // two evaluations
        let run = simulate_direction(Direction::Upload, 8, 10_000, |t, n| {
            let rate = (n as f64 * 100e6).min(400e6);
            if t >= 3250 {
                rate * 0.6
            } else {
                rate
            }
        });

        let removals: Vec<_> = run
            .decisions
            .iter()
            .filter(|(_, d)| matches!(d, ScalingDecision::Remove(_)))
            .collect();
        assert_eq!(removals.len(), 1, "decisions {:?}", run.decisions);
        let (removed_at, removed) = *removals[0];
        assert_eq!(removed, ScalingDecision::Remove(6));
        assert!(removed_at > 3250);
        assert!(run
            .decisions
            .iter()
            .all(|(t, d)| *t <= removed_at || !matches!(d, ScalingDecision::Add(_))));
        assert_eq!(run.controller.status(), ScalingStatus::Sustain);
        assert_eq!(run.controller.active_workers(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn finish_reports_average_not_display_rate() {
        // Collapse late so the display lags well above the average
        let mut run = simulate(4, 10_000, |t, n| if t > 9_000 { 0.0 } else { n as f64 * 100e6 });
        let end = run.t0 + Duration::from_millis(10_000);
        let expected = run.controller.average_rate(end);
        let ui = run.controller.ui_rate();
        let speed = run.controller.finish(end).unwrap();

        assert_eq!(speed.bits_per_second, expected);
        assert!(ui > speed.bits_per_second);
        assert_eq!(speed.elapsed, Duration::from_millis(10_000));
        assert!(run.last_update.is_some());
    }

    #[test]
    fn finish_is_idempotent() {
        let t0 = Instant::now();
        let mut c = PoolController::new(Direction::Upload, &EngineTuning::default(), 6, t0);
        c.start();
        c.record_sample(&sample(0, 1_000_000, t0 + Duration::from_millis(100)));

        assert!(c.finish(t0 + Duration::from_secs(1)).is_some());
        assert!(c.finish(t0 + Duration::from_secs(2)).is_none());
        assert!(c.is_finished());
        assert!(c.active_workers().is_empty());
        assert_eq!(c.evaluate(t0 + Duration::from_secs(3)), ScalingDecision::Hold);
    }

    #[test]
    fn stale_samples_never_regress() {
        let t0 = Instant::now();
        let mut c = PoolController::new(Direction::Download, &EngineTuning::default(), 6, t0);
        c.start();
        let later = t0 + Duration::from_millis(100);

        c.record_sample(&sample(0, 5_000, later));
        c.record_sample(&sample(0, 3_000, later));
        c.record_sample(&sample(0, 5_000, later));
        assert_eq!(c.worker_bytes(0), 5_000);

        c.record_sample(&sample(0, 7_000, later));
        c.record_sample(&sample(1, 1_000, later));
        c.record_sample(&sample(0, 6_999, later));
        assert_eq!(c.worker_bytes(0), 7_000);
        assert_eq!(c.total_bytes(), 8_000);
    }

    #[test]
    fn shuffled_reports_keep_per_worker_maximum() {
        let t0 = Instant::now();
        let mut c = PoolController::new(Direction::Download, &EngineTuning::default(), 6, t0);
        let mut seed: u64 = 42;
        let mut highest = [0u64; 3];
        let mut last_total = 0;
        for _ in 0..500 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let worker = (seed >> 33) as usize % 3;
            let bytes = (seed >> 20) % 1_000_000;
            highest[worker] = highest[worker].max(bytes);

            let before = c.worker_bytes(worker);
            c.record_sample(&sample(worker, bytes, t0));
            assert!(c.worker_bytes(worker) >= before);

            let total = c.total_bytes();
            assert!(total >= last_total);
            last_total = total;
        }
        for (id, max) in highest.iter().enumerate() {
            assert_eq!(c.worker_bytes(id), *max);
        }
    }

    #[test]
    fn pool_never_exceeds_max_threads() {
        for max_threads in 1..=8 {
            let run = simulate(max_threads, 6_000, |t, n| n as f64 * (50e6 + t as f64 * 1e5));
            assert!(run.pool_sizes.iter().all(|n| *n <= max_threads));
        }
    }

    #[test]
    fn display_held_at_zero_early() {
        let t0 = Instant::now();
        let mut c = PoolController::new(Direction::Download, &EngineTuning::default(), 6, t0);
        c.start();
        c.record_sample(&sample(0, 10_000_000, t0 + Duration::from_millis(100)));
        let update = c.ui_tick(t0 + Duration::from_millis(100));
        assert_eq!(update.ui_rate_bps, 0.0);
        assert!(update.average_bps > 0.0);
        assert_eq!(update.active_workers, 2);
    }

    #[test]
    fn worker_failed_drops_from_active_set() {
        let t0 = Instant::now();
        let mut c = PoolController::new(Direction::Download, &EngineTuning::default(), 6, t0);
        assert_eq!(c.start(), vec![0, 1]);
        assert!(c.start().is_empty());
        c.worker_failed(1);
        assert_eq!(c.active_workers(), &[0]);
    }
}
