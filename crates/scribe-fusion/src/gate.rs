use tracing::debug;

use crate::types::BlockingReason;
use scribe_core::bounded::BoundedMap;
use scribe_core::config::{GateConfig, DEFAULT_MIN_PRUNE_INTERVAL_MS};
use scribe_core::types::{AttemptId, PlatformReadiness};

/// Per-attempt stability bookkeeping.
#[derive(Debug, Clone)]
struct SampleState {
    first_seen_at_ms: u64,
    stabilization_started_at_ms: u64,
    last_seen_at_ms: u64,
    content_hash: String,
    timed_out: bool,
}

/// What the gate concluded for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub ready: bool,
    pub blocking: Vec<BlockingReason>,
    /// Content kept churning past the stabilization budget. Terminal for
    /// this attempt; the runner may still export as degraded.
    pub timed_out: bool,
}

impl GateVerdict {
    fn blocked(reasons: Vec<BlockingReason>) -> Self {
        Self {
            ready: false,
            blocking: reasons,
            timed_out: false,
        }
    }

    fn timed_out() -> Self {
        Self {
            ready: false,
            blocking: vec![BlockingReason::StabilizationTimeout],
            timed_out: true,
        }
    }

    fn ready() -> Self {
        Self {
            ready: true,
            blocking: Vec::new(),
            timed_out: false,
        }
    }
}

/// Enforces content-hash stability over time before readiness may fire.
///
/// A sample is only "ready" once two samples with the same hash have been
/// seen at least `min_stable_ms` apart, with no intervening change, and
/// before `max_stabilization_wait_ms` of churn has elapsed.
pub struct ReadinessGate {
    config: GateConfig,
    samples: BoundedMap<AttemptId, SampleState>,
    last_prune_at_ms: u64,
}

impl ReadinessGate {
    pub fn new(config: GateConfig) -> Self {
        let max_samples = config.max_samples;
        Self {
            config,
            samples: BoundedMap::new(max_samples),
            last_prune_at_ms: 0,
        }
    }

    /// Apply one canonical sample for an attempt at the given timestamp.
    /// Timestamps come from the controller's monotonic clock; the gate only
    /// ever compares against its own last-seen state for the same attempt.
    pub fn apply(
        &mut self,
        attempt_id: &AttemptId,
        readiness: &PlatformReadiness,
        timestamp_ms: u64,
    ) -> GateVerdict {
        self.apply_with_window(attempt_id, readiness, timestamp_ms, self.config.min_stable_ms)
    }

    /// Same as [`apply`](Self::apply) with a per-platform stability-window
    /// override from the calibration profile.
    pub fn apply_with_window(
        &mut self,
        attempt_id: &AttemptId,
        readiness: &PlatformReadiness,
        timestamp_ms: u64,
        min_stable_ms: u64,
    ) -> GateVerdict {
        self.prune(timestamp_ms);

        let Some(hash) = readiness.content_hash.clone() else {
            return GateVerdict::blocked(vec![BlockingReason::NoCanonicalData]);
        };
        if readiness.latest_assistant_text_len == 0 {
            return GateVerdict::blocked(vec![BlockingReason::NoCanonicalData]);
        }
        if !readiness.terminal {
            return GateVerdict::blocked(vec![BlockingReason::CanonicalNotTerminal]);
        }

        let Some(state) = self.samples.get_mut(attempt_id) else {
            self.samples.insert(
                attempt_id.clone(),
                SampleState {
                    first_seen_at_ms: timestamp_ms,
                    stabilization_started_at_ms: timestamp_ms,
                    last_seen_at_ms: timestamp_ms,
                    content_hash: hash,
                    timed_out: false,
                },
            );
            return GateVerdict::blocked(vec![BlockingReason::AwaitingSecondSample]);
        };

        state.last_seen_at_ms = timestamp_ms;
        if state.timed_out {
            return GateVerdict::timed_out();
        }

        let total_wait = timestamp_ms.saturating_sub(state.stabilization_started_at_ms);

        if state.content_hash != hash {
            // Content still churning: restart the stability window but keep
            // the overall stabilization budget running.
            state.content_hash = hash;
            state.first_seen_at_ms = timestamp_ms;
            if total_wait > self.config.max_stabilization_wait_ms {
                debug!(attempt = %attempt_id, total_wait, "stabilization budget exhausted");
                state.timed_out = true;
                return GateVerdict::timed_out();
            }
            return GateVerdict::blocked(vec![
                BlockingReason::ContentHashChanged,
                BlockingReason::AwaitingSecondSample,
            ]);
        }

        let window = timestamp_ms.saturating_sub(state.first_seen_at_ms);
        if window < min_stable_ms {
            if total_wait > self.config.max_stabilization_wait_ms {
                state.timed_out = true;
                return GateVerdict::timed_out();
            }
            return GateVerdict::blocked(vec![BlockingReason::StabilityWindowNotElapsed]);
        }

        GateVerdict::ready()
    }

    /// Forget an attempt's sample state (on dispose).
    pub fn forget(&mut self, attempt_id: &AttemptId) {
        self.samples.remove(attempt_id);
    }

    pub fn tracked_samples(&self) -> usize {
        self.samples.len()
    }

    /// Opportunistic TTL pruning, at most once per second.
    fn prune(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_prune_at_ms) < DEFAULT_MIN_PRUNE_INTERVAL_MS {
            return;
        }
        self.last_prune_at_ms = now_ms;
        let ttl = self.config.sample_ttl_ms;
        self.samples
            .retain(|_, s| now_ms.saturating_sub(s.last_seen_at_ms) <= ttl);
    }
}
