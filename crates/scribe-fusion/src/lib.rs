pub mod engine;
pub mod gate;
pub mod lifecycle;
pub mod types;

pub use engine::SignalFusionEngine;
pub use gate::{GateVerdict, ReadinessGate};
pub use lifecycle::{LifecycleTracker, Transition};
pub use types::{AttemptPhase, BlockingReason, CanonicalSample, ReadinessDecision, SampleOutcome};
