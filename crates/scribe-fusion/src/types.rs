use serde::{Deserialize, Serialize};

use scribe_core::types::{AttemptId, PlatformReadiness};
use scribe_protocol::frames::LifecyclePhase;

/// Where an attempt sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    #[default]
    Idle,
    PromptSent,
    Streaming,
    Completed,
    /// A newer attempt took over this conversation. Absorbing for
    /// readiness; only disposal can follow.
    Superseded,
    /// Absorbing terminal state on dispose.
    Terminated,
}

impl AttemptPhase {
    /// Priority ordering: any transition to a phase with priority ≤ the
    /// current one is a regression and is rejected.
    pub fn priority(&self) -> u8 {
        match self {
            AttemptPhase::Idle => 0,
            AttemptPhase::PromptSent => 1,
            AttemptPhase::Streaming => 2,
            AttemptPhase::Completed => 3,
            AttemptPhase::Superseded => 4,
            AttemptPhase::Terminated => 5,
        }
    }

    pub fn from_lifecycle(phase: LifecyclePhase) -> Self {
        match phase {
            LifecyclePhase::PromptSent => AttemptPhase::PromptSent,
            LifecyclePhase::Streaming => AttemptPhase::Streaming,
            LifecyclePhase::Completed => AttemptPhase::Completed,
        }
    }
}

/// The single readiness decision emitted per (conversation, attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessDecision {
    #[default]
    AwaitingPrompt,
    AwaitingStream,
    AwaitingStabilization,
    CanonicalReady,
    DegradedReady,
    Terminated,
}

/// Why the readiness gate is holding a sample back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    NoCanonicalData,
    CanonicalNotTerminal,
    AwaitingSecondSample,
    ContentHashChanged,
    StabilityWindowNotElapsed,
    StabilizationTimeout,
}

/// One canonical capture offered to the gate.
#[derive(Debug, Clone)]
pub struct CanonicalSample {
    pub attempt_id: AttemptId,
    pub conversation_id: String,
    pub timestamp_ms: u64,
    pub readiness: PlatformReadiness,
}

/// Result of applying a canonical sample to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub ready: bool,
    pub phase: AttemptPhase,
    pub blocking: Vec<BlockingReason>,
    pub decision: ReadinessDecision,
}
