use scribe_core::types::{AttemptId, ExportMeta, Provider};
use scribe_fusion::types::ReadinessDecision;
use scribe_model::conversation::Conversation;
use scribe_platforms::adapter::TitleUpdate;

/// A stable, canonical-ready capture the hub should see.
#[derive(Debug, Clone)]
pub struct ReadyCapture {
    pub conversation_id: String,
    pub provider: Provider,
    pub conversation: Conversation,
    pub attempt_id: AttemptId,
    pub capture_meta: ExportMeta,
    pub content_hash: Option<String>,
}

/// What a runner dispatch produced for downstream consumers.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// The readiness gate opened: this capture may be exported and
    /// announced externally.
    CanonicalReady(ReadyCapture),
    /// The gate gave up on stabilization; force-save is the only path.
    DegradedReady { conversation_id: String },
    /// A provider title endpoint renamed a conversation.
    TitleUpdated(TitleUpdate),
    /// A completion-trigger URL fired without a parseable payload: the
    /// stream is done and the full JSON should be warm-fetched.
    WarmFetchRequested { conversation_id: String },
}

/// What the UI may offer for a conversation right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportState {
    pub decision: ReadinessDecision,
    /// Save enables only at `canonical_ready`.
    pub save_enabled: bool,
    /// Force-save appears under `degraded_ready`.
    pub force_save_available: bool,
}

impl ExportState {
    pub fn from_decision(decision: ReadinessDecision) -> Self {
        Self {
            decision,
            save_enabled: decision == ReadinessDecision::CanonicalReady,
            force_save_available: decision == ReadinessDecision::DegradedReady,
        }
    }
}
