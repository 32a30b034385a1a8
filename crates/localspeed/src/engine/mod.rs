//! Measurement engine: pool scaling, rate smoothing and phase execution

pub mod controller;
pub mod events;
pub mod phase;
pub mod scaling;
pub mod smoothing;
pub mod tuning;

pub use controller::{PhaseSpeed, PoolController, ScalingDecision, SpeedUpdate};
pub use events::{EventBus, TestEvent};
pub use phase::{start_phase, PhaseConfig, PhaseStop, RunningPhase};
pub use scaling::{ScalingAction, ScalingPolicy, ScalingStatus};
pub use tuning::{DirectionTuning, EngineTuning};
