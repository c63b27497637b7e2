// End-to-end decision behavior of the fusion engine: monotonic lifecycle,
// stability-gated readiness, supersession, and timeout degradation.

use scribe_core::config::GateConfig;
use scribe_core::types::{AttemptId, PlatformReadiness, Provider};
use scribe_fusion::engine::SignalFusionEngine;
use scribe_fusion::types::{AttemptPhase, CanonicalSample, ReadinessDecision};
use scribe_protocol::frames::LifecyclePhase;

fn aid(s: &str) -> AttemptId {
    AttemptId::from(s)
}

fn sample(attempt: &str, conv: &str, hash: &str, ts: u64) -> CanonicalSample {
    CanonicalSample {
        attempt_id: aid(attempt),
        conversation_id: conv.to_string(),
        timestamp_ms: ts,
        readiness: PlatformReadiness::ready(hash.to_string(), 24),
    }
}

#[test]
fn observed_phases_never_regress() {
    // Feed an adversarial signal order; the tracked phase priority must be
    // non-decreasing throughout.
    let mut sfe = SignalFusionEngine::new(GateConfig::default());
    let a = aid("chatgpt:a1");
    let signals = [
        LifecyclePhase::Streaming,
        LifecyclePhase::PromptSent, // regression
        LifecyclePhase::Completed,
        LifecyclePhase::Streaming, // regression
        LifecyclePhase::PromptSent, // regression
        LifecyclePhase::Completed, // repeat
    ];

    let mut last_priority = 0u8;
    for phase in signals {
        sfe.ingest_lifecycle(&a, Provider::Chatgpt, phase, Some("c1".into()));
        let current = sfe.phase(&a).priority();
        assert!(current >= last_priority, "phase priority regressed");
        last_priority = current;
    }
    assert_eq!(sfe.phase(&a), AttemptPhase::Completed);
}

#[test]
fn stability_gate_full_scenario() {
    // S4 plus the hash-change reset from invariant 4.
    let mut sfe = SignalFusionEngine::new(GateConfig::default());

    assert!(!sfe.apply_canonical_sample(&sample("a1", "c1", "h1", 0)).ready);
    assert!(!sfe.apply_canonical_sample(&sample("a1", "c1", "h1", 500)).ready);
    assert!(sfe.apply_canonical_sample(&sample("a1", "c1", "h1", 1000)).ready);

    // An intervening hash change resets the window.
    assert!(!sfe.apply_canonical_sample(&sample("a1", "c1", "h2", 1100)).ready);
    assert!(!sfe.apply_canonical_sample(&sample("a1", "c1", "h2", 1500)).ready);
    assert!(sfe.apply_canonical_sample(&sample("a1", "c1", "h2", 2100)).ready);
}

#[test]
fn supersession_is_permanent() {
    let mut sfe = SignalFusionEngine::new(GateConfig::default());
    sfe.ingest_lifecycle(&aid("a1"), Provider::Gemini, LifecyclePhase::PromptSent, Some("c1".into()));
    sfe.ingest_lifecycle(&aid("a2"), Provider::Gemini, LifecyclePhase::PromptSent, Some("c1".into()));

    // Long after the stability window, a1 is still refused.
    for ts in [0u64, 1_000, 10_000, 100_000] {
        let out = sfe.apply_canonical_sample(&sample("a1", "c1", "stable", ts));
        assert!(!out.ready);
        assert_eq!(out.phase, AttemptPhase::Superseded);
    }
}

#[test]
fn churn_degrades_then_dispose_terminates() {
    let mut sfe = SignalFusionEngine::new(GateConfig {
        max_stabilization_wait_ms: 2_000,
        ..GateConfig::default()
    });
    let mut decision = None;
    for (i, ts) in (0u64..6).map(|i| (i, i * 800)) {
        let out = sfe.apply_canonical_sample(&sample("a1", "c1", &format!("h{i}"), ts));
        decision = Some(out.decision);
    }
    assert_eq!(decision, Some(ReadinessDecision::DegradedReady));

    sfe.dispose(&aid("a1"));
    assert_eq!(sfe.decision(&aid("a1")), ReadinessDecision::Terminated);
}

#[test]
fn cold_attempt_discovery_does_not_invalidate_owner() {
    // A page-load artifact: a freshly minted attempt's first lifecycle
    // frame is streaming (never prompt-sent) and carries the conversation
    // id already owned by a live attempt. The owner's readiness survives.
    let mut sfe = SignalFusionEngine::new(GateConfig::default());
    sfe.ingest_lifecycle(&aid("a1"), Provider::Chatgpt, LifecyclePhase::PromptSent, Some("c1".into()));
    sfe.ingest_lifecycle(&aid("cold"), Provider::Chatgpt, LifecyclePhase::Streaming, Some("c1".into()));
    sfe.ingest_lifecycle(&aid("cold"), Provider::Chatgpt, LifecyclePhase::Completed, Some("c1".into()));

    assert!(!sfe.is_superseded(&aid("a1")));
    sfe.apply_canonical_sample(&sample("a1", "c1", "h", 0));
    assert!(sfe.apply_canonical_sample(&sample("a1", "c1", "h", 1_000)).ready);
}

#[test]
fn distinct_conversations_do_not_interfere() {
    let mut sfe = SignalFusionEngine::new(GateConfig::default());
    sfe.ingest_lifecycle(&aid("a1"), Provider::Grok, LifecyclePhase::PromptSent, Some("c1".into()));
    sfe.ingest_lifecycle(&aid("a2"), Provider::Grok, LifecyclePhase::PromptSent, Some("c2".into()));

    // Different conversations: no supersession in either direction.
    assert!(!sfe.is_superseded(&aid("a1")));
    assert!(!sfe.is_superseded(&aid("a2")));

    sfe.apply_canonical_sample(&sample("a1", "c1", "h", 0));
    sfe.apply_canonical_sample(&sample("a2", "c2", "h", 0));
    assert!(sfe.apply_canonical_sample(&sample("a1", "c1", "h", 1000)).ready);
    assert!(sfe.apply_canonical_sample(&sample("a2", "c2", "h", 1000)).ready);
}
