use tracing::debug;

use crate::gate::ReadinessGate;
use crate::lifecycle::{LifecycleTracker, Transition};
use crate::types::{AttemptPhase, CanonicalSample, ReadinessDecision, SampleOutcome};
use scribe_core::config::GateConfig;
use scribe_core::types::{AttemptId, ExportMeta, Provider};
use scribe_protocol::frames::LifecyclePhase;

/// Fuses lifecycle, stream, and canonical-capture signals into a single
/// monotonic readiness decision per attempt.
///
/// Stream deltas are indicative only: they update nothing here and never
/// prove readiness. Canonical samples prove readiness, but only through the
/// stability gate, and never for a superseded attempt.
pub struct SignalFusionEngine {
    lifecycle: LifecycleTracker,
    gate: ReadinessGate,
}

impl SignalFusionEngine {
    pub fn new(gate_config: GateConfig) -> Self {
        Self {
            lifecycle: LifecycleTracker::new(),
            gate: ReadinessGate::new(gate_config),
        }
    }

    /// Whether a capture qualifies for the gate at all.
    pub fn should_ingest_as_canonical_sample(meta: &ExportMeta) -> bool {
        meta.is_canonical_high()
    }

    pub fn ingest_lifecycle(
        &mut self,
        attempt_id: &AttemptId,
        platform: Provider,
        phase: LifecyclePhase,
        conversation_id: Option<String>,
    ) -> Transition {
        self.lifecycle
            .observe(attempt_id, platform, phase, conversation_id)
    }

    /// Apply one canonical sample. A superseded attempt gets a refusal
    /// without the gate ever seeing the sample.
    pub fn apply_canonical_sample(&mut self, sample: &CanonicalSample) -> SampleOutcome {
        self.apply_canonical_sample_with_window(sample, None)
    }

    /// Same, with a per-platform stability-window override.
    pub fn apply_canonical_sample_with_window(
        &mut self,
        sample: &CanonicalSample,
        min_stable_ms: Option<u64>,
    ) -> SampleOutcome {
        if self.lifecycle.is_superseded(&sample.attempt_id) {
            debug!(attempt = %sample.attempt_id, "refusing canonical sample for superseded attempt");
            return SampleOutcome {
                ready: false,
                phase: AttemptPhase::Superseded,
                blocking: Vec::new(),
                decision: ReadinessDecision::AwaitingStabilization,
            };
        }

        // First sight of the conversation id binds it to this attempt.
        if self
            .lifecycle
            .attempt_for_conversation(&sample.conversation_id)
            .is_none()
        {
            self.lifecycle
                .bind_conversation(&sample.attempt_id, &sample.conversation_id);
        }

        let verdict = match min_stable_ms {
            Some(ms) => self.gate.apply_with_window(
                &sample.attempt_id,
                &sample.readiness,
                sample.timestamp_ms,
                ms,
            ),
            None => self
                .gate
                .apply(&sample.attempt_id, &sample.readiness, sample.timestamp_ms),
        };
        let phase = self.lifecycle.phase(&sample.attempt_id);

        let decision = if verdict.ready {
            ReadinessDecision::CanonicalReady
        } else if verdict.timed_out {
            ReadinessDecision::DegradedReady
        } else {
            decision_for_phase(phase)
        };

        SampleOutcome {
            ready: verdict.ready,
            phase,
            blocking: verdict.blocking,
            decision,
        }
    }

    pub fn dispose(&mut self, attempt_id: &AttemptId) {
        self.lifecycle.dispose(attempt_id);
        self.gate.forget(attempt_id);
    }

    pub fn phase(&self, attempt_id: &AttemptId) -> AttemptPhase {
        self.lifecycle.phase(attempt_id)
    }

    pub fn is_superseded(&self, attempt_id: &AttemptId) -> bool {
        self.lifecycle.is_superseded(attempt_id)
    }

    pub fn attempt_for_conversation(&self, conversation_id: &str) -> Option<AttemptId> {
        self.lifecycle.attempt_for_conversation(conversation_id)
    }

    pub fn conversation_of(&self, attempt_id: &AttemptId) -> Option<String> {
        self.lifecycle.conversation_of(attempt_id)
    }

    /// The decision an attempt currently sits at, absent a fresh sample.
    pub fn decision(&self, attempt_id: &AttemptId) -> ReadinessDecision {
        decision_for_phase(self.lifecycle.phase(attempt_id))
    }
}

fn decision_for_phase(phase: AttemptPhase) -> ReadinessDecision {
    match phase {
        AttemptPhase::Idle => ReadinessDecision::AwaitingPrompt,
        AttemptPhase::PromptSent => ReadinessDecision::AwaitingStream,
        AttemptPhase::Streaming
        | AttemptPhase::Completed
        | AttemptPhase::Superseded => ReadinessDecision::AwaitingStabilization,
        AttemptPhase::Terminated => ReadinessDecision::Terminated,
    }
}
