//! Test event broadcasting
//!
//! `EventBus` fans discrete `TestEvent`s out to any number of subscribers
//! (UI, CLI progress line, loggers). Subscribers that hang up are dropped on
//! the next emit.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::latency::LatencyStats;
use crate::types::{Direction, PhaseResult, TestResult};

use super::controller::SpeedUpdate;

/// Discrete events of one test run, in emission order
#[derive(Debug, Clone)]
pub enum TestEvent {
    TestStarted,
    /// Idle ping and jitter, before any load
    IdleLatency(LatencyStats),
    PhaseStarted(Direction),
    SpeedUpdate(SpeedUpdate),
    /// One loaded-latency observation
    LatencyUpdate {
        direction: Direction,
        latency_ms: f64,
    },
    PhaseComplete(PhaseResult),
    /// Start of a cooldown: displays should return to zero
    DisplayReset,
    TestComplete(TestResult),
    /// User-facing failure notification
    Error(String),
}

/// Broadcast mechanism for test events
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<TestEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> Receiver<TestEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Emit an event to all subscribers. Removes disconnected subscribers.
    pub fn emit(&self, event: TestEvent) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
