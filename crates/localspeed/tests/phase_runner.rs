//! Phase runner against simulated links

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use localspeed::engine::{start_phase, EventBus, EngineTuning, PhaseConfig, TestEvent};
use localspeed::transfer::{ChunkBounds, SimulatedTransport};
use localspeed::types::Direction;

fn config(direction: Direction, max_threads: usize, duration_ms: u64) -> PhaseConfig {
    PhaseConfig {
        direction,
        url: "http://sim.invalid/transfer".to_string(),
        max_threads,
        duration: Duration::from_millis(duration_ms),
        reporting_interval: Duration::from_millis(20),
        chunk_bounds: ChunkBounds::new(32 * 1024, 512 * 1024),
        tuning: EngineTuning {
            warmup_ms: 200,
            evaluation_interval_ms: 100,
            display_delay_ms: 50,
            ..EngineTuning::default()
        },
    }
}

#[test]
fn single_thread_phase_keeps_one_stream() {
    let transport = Arc::new(SimulatedTransport::new(50_000_000.0));
    let events = Arc::new(EventBus::new());
    let rx = events.subscribe();

    let phase = start_phase(config(Direction::Download, 1, 800), transport.clone(), events).unwrap();

    let mut peak = 0;
    while !phase.is_finished() {
        peak = peak.max(transport.active_streams());
        thread::sleep(Duration::from_millis(5));
    }
    let speed = phase.wait(Duration::from_secs(1)).unwrap();

    assert!(peak <= 1);
    assert_eq!(speed.workers, 1);
    assert!(rx.try_iter().all(|e| match e {
        TestEvent::SpeedUpdate(u) => u.active_workers == 1,
        _ => true,
    }));
}

#[test]
fn pool_grows_on_a_scalable_link() {
    // Every extra stream adds the same rate
    let transport = Arc::new(SimulatedTransport::new(40_000_000.0));
    let phase = start_phase(
        config(Direction::Download, 4, 1_500),
        transport,
        Arc::new(EventBus::new()),
    )
    .unwrap();
    let speed = phase.wait(Duration::from_secs(5)).unwrap();
    assert_eq!(speed.workers, 4);
}

#[test]
fn pool_respects_max_threads_on_a_shared_link() {
    let transport = Arc::new(SimulatedTransport::new(1e9).with_capacity(200_000_000.0));
    let events = Arc::new(EventBus::new());
    let rx = events.subscribe();

    let phase = start_phase(config(Direction::Upload, 3, 1_200), transport, events).unwrap();
    let speed = phase.wait(Duration::from_secs(5)).unwrap();

    assert!(speed.workers <= 3);
    for event in rx.try_iter() {
        if let TestEvent::SpeedUpdate(update) = event {
            assert!(update.active_workers <= 3);
            assert_eq!(update.direction, Direction::Upload);
        }
    }
}

#[test]
fn racing_stops_produce_one_result() {
    let transport = Arc::new(SimulatedTransport::new(40_000_000.0));
    let phase = start_phase(
        config(Direction::Download, 4, 300),
        transport,
        Arc::new(EventBus::new()),
    )
    .unwrap();

    // Two stoppers racing the phase's own deadline
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let stop = phase.stop_handle();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                stop.stop()
            })
        })
        .collect();
    let flipped = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|f| *f)
        .count();

    assert_eq!(flipped, 1);
    let speed = phase.wait(Duration::from_secs(2)).unwrap();
    assert!(speed.bits_per_second > 0.0);
}

#[test]
fn speed_updates_stay_within_drop_limit() {
    let transport = Arc::new(SimulatedTransport::new(30_000_000.0));
    let events = Arc::new(EventBus::new());
    let rx = events.subscribe();
    let tuning = EngineTuning::default();

    let phase = start_phase(config(Direction::Download, 2, 700), transport, events).unwrap();
    phase.wait(Duration::from_secs(3)).unwrap();

    let mut previous: Option<f64> = None;
    for event in rx.try_iter() {
        if let TestEvent::SpeedUpdate(update) = event {
            if let Some(prev) = previous {
                assert!(update.ui_rate_bps >= prev * tuning.download.drop_limit - 1e-6);
            }
            previous = Some(update.ui_rate_bps);
        }
    }
    assert!(previous.is_some());
}

#[test]
fn phase_ends_near_its_duration() {
    let transport = Arc::new(SimulatedTransport::new(20_000_000.0));
    let started = Instant::now();
    let phase = start_phase(
        config(Direction::Upload, 2, 500),
        transport,
        Arc::new(EventBus::new()),
    )
    .unwrap();
    let speed = phase.wait(Duration::from_secs(3)).unwrap();

    assert!(speed.elapsed >= Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(2));
}
