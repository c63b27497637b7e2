use tracing::debug;

use crate::types::AttemptPhase;
use scribe_core::bounded::BoundedMap;
use scribe_core::config::DEFAULT_ATTEMPT_MAP_CAP;
use scribe_core::types::{AttemptId, Provider};
use scribe_protocol::frames::LifecyclePhase;

/// Per-attempt lifecycle record.
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub platform: Provider,
    pub phase: AttemptPhase,
    pub conversation_id: Option<String>,
}

/// Outcome of feeding one lifecycle signal into the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// False when the signal was a regression and was discarded.
    pub applied: bool,
    pub phase: AttemptPhase,
    /// The older attempt this signal displaced on the same conversation.
    pub superseded: Option<AttemptId>,
}

/// Tracks attempt phases with monotonic transitions and supersession.
///
/// All three maps are bounded: attempts fall off after enough newer ones
/// arrive, which is the intended memory ceiling for a long-lived tab.
pub struct LifecycleTracker {
    attempts: BoundedMap<AttemptId, AttemptState>,
    latest_by_platform: BoundedMap<Provider, AttemptId>,
    by_conversation: BoundedMap<String, AttemptId>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ATTEMPT_MAP_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            attempts: BoundedMap::new(cap),
            latest_by_platform: BoundedMap::new(cap),
            by_conversation: BoundedMap::new(cap),
        }
    }

    /// Feed one lifecycle signal. Regressions (priority ≤ current) are
    /// rejected; a prompt-sent that binds an already-owned conversation
    /// supersedes the previous owner.
    pub fn observe(
        &mut self,
        attempt_id: &AttemptId,
        platform: Provider,
        phase: LifecyclePhase,
        conversation_id: Option<String>,
    ) -> Transition {
        let target = AttemptPhase::from_lifecycle(phase);
        let current = self.phase(attempt_id);

        if target.priority() <= current.priority() {
            debug!(
                attempt = %attempt_id,
                current = ?current,
                attempted = ?target,
                "rejecting lifecycle regression"
            );
            return Transition {
                applied: false,
                phase: current,
                superseded: None,
            };
        }

        let mut superseded = None;
        if let Some(conv_id) = &conversation_id {
            if phase == LifecyclePhase::PromptSent {
                // Only a prompt-sent on an already-owned conversation
                // displaces the owner.
                superseded = self.bind_conversation(attempt_id, conv_id);
            } else if self.by_conversation.get(conv_id).is_none() {
                // Late conversation-id discovery (streaming/completed
                // frames from a cold payload fetch) claims an unowned
                // conversation but never displaces a live attempt.
                self.by_conversation
                    .insert(conv_id.clone(), attempt_id.clone());
            }
        }

        let state = AttemptState {
            platform,
            phase: target,
            conversation_id: conversation_id.or_else(|| {
                self.attempts
                    .get(attempt_id)
                    .and_then(|s| s.conversation_id.clone())
            }),
        };
        self.attempts.insert(attempt_id.clone(), state);
        self.latest_by_platform
            .insert(platform, attempt_id.clone());

        Transition {
            applied: true,
            phase: target,
            superseded,
        }
    }

    /// Bind an attempt to a conversation, superseding the previous owner if
    /// it is a different, still-live attempt. Returns the displaced attempt.
    pub fn bind_conversation(
        &mut self,
        attempt_id: &AttemptId,
        conversation_id: &str,
    ) -> Option<AttemptId> {
        let key = conversation_id.to_string();
        let previous = self.by_conversation.get(&key).cloned();
        self.by_conversation.insert(key, attempt_id.clone());

        if let Some(conv) = self
            .attempts
            .get_mut(attempt_id)
            .map(|s| &mut s.conversation_id)
        {
            *conv = Some(conversation_id.to_string());
        }

        match previous {
            Some(prior) if prior != *attempt_id => {
                if let Some(state) = self.attempts.get_mut(&prior) {
                    if state.phase != AttemptPhase::Terminated {
                        debug!(old = %prior, new = %attempt_id, conversation = conversation_id,
                               "attempt superseded");
                        state.phase = AttemptPhase::Superseded;
                        return Some(prior);
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Absorbing terminal state on dispose.
    pub fn dispose(&mut self, attempt_id: &AttemptId) {
        if let Some(state) = self.attempts.get_mut(attempt_id) {
            state.phase = AttemptPhase::Terminated;
        }
    }

    pub fn phase(&self, attempt_id: &AttemptId) -> AttemptPhase {
        self.attempts
            .get(attempt_id)
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    pub fn is_superseded(&self, attempt_id: &AttemptId) -> bool {
        self.phase(attempt_id) == AttemptPhase::Superseded
    }

    pub fn conversation_of(&self, attempt_id: &AttemptId) -> Option<String> {
        self.attempts
            .get(attempt_id)
            .and_then(|s| s.conversation_id.clone())
    }

    pub fn attempt_for_conversation(&self, conversation_id: &str) -> Option<AttemptId> {
        self.by_conversation
            .get(&conversation_id.to_string())
            .cloned()
    }

    pub fn latest_attempt(&self, platform: Provider) -> Option<AttemptId> {
        self.latest_by_platform.get(&platform).cloned()
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}
