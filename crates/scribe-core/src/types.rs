use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which LLM platform a capture originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Chatgpt,
    Gemini,
    Grok,
    #[default]
    Unknown,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Chatgpt => write!(f, "chatgpt"),
            Provider::Gemini => write!(f, "gemini"),
            Provider::Grok => write!(f, "grok"),
            Provider::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chatgpt" => Ok(Provider::Chatgpt),
            "gemini" => Ok(Provider::Gemini),
            "grok" => Ok(Provider::Grok),
            "unknown" => Ok(Provider::Unknown),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// One in-flight user turn on one page.
///
/// Format: `{platform}:{uuid}` — the platform prefix makes attempt ids
/// self-describing in logs and in the bridge frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl AttemptId {
    pub fn mint(provider: Provider) -> Self {
        Self(format!("{}:{}", provider, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the platform prefix back out, if present.
    pub fn provider(&self) -> Provider {
        self.0
            .split_once(':')
            .and_then(|(p, _)| p.parse().ok())
            .unwrap_or(Provider::Unknown)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AttemptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AttemptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Provider-normalized conversation identifier (prefixes like `c_` stripped
/// by the owning adapter before construction).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a captured conversation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Reconstructed from the provider's own API or stream.
    CanonicalApi,
    /// Reconstructed from a DOM snapshot after canonical recovery failed.
    DomSnapshotDegraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    High,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Partial,
}

/// Capture provenance attached to every conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    #[serde(rename = "captureSource")]
    pub capture_source: CaptureSource,
    pub fidelity: Fidelity,
    pub completeness: Completeness,
}

impl ExportMeta {
    /// The full-fidelity canonical capture: `{canonical_api, high, complete}`.
    pub fn canonical() -> Self {
        Self {
            capture_source: CaptureSource::CanonicalApi,
            fidelity: Fidelity::High,
            completeness: Completeness::Complete,
        }
    }

    pub fn degraded() -> Self {
        Self {
            capture_source: CaptureSource::DomSnapshotDegraded,
            fidelity: Fidelity::Degraded,
            completeness: Completeness::Partial,
        }
    }

    /// Whether a capture qualifies as an SFE canonical sample.
    pub fn is_canonical_high(&self) -> bool {
        self.capture_source == CaptureSource::CanonicalApi && self.fidelity == Fidelity::High
    }

    /// Whether a capture may short-circuit warm-fetch recovery. Only the
    /// complete canonical form qualifies.
    pub fn is_complete_canonical(&self) -> bool {
        self.is_canonical_high() && self.completeness == Completeness::Complete
    }
}

/// Why an adapter's readiness evaluator said yes or no.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessReason {
    Terminal,
    AssistantMissing,
    AssistantInProgress,
    AssistantTextMissing,
    /// ChatGPT: a finished assistant message exists but none closes the turn.
    AssistantTextNotTerminalTurn,
    /// Gemini/Grok: the latest assistant message does not close the turn.
    AssistantLatestTextNotTerminalTurn,
}

/// Output of a platform adapter's readiness evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformReadiness {
    pub ready: bool,
    pub terminal: bool,
    pub reason: ReadinessReason,
    pub content_hash: Option<String>,
    pub latest_assistant_text_len: usize,
}

impl PlatformReadiness {
    pub fn ready(content_hash: String, latest_assistant_text_len: usize) -> Self {
        Self {
            ready: true,
            terminal: true,
            reason: ReadinessReason::Terminal,
            content_hash: Some(content_hash),
            latest_assistant_text_len,
        }
    }

    pub fn not_ready(reason: ReadinessReason, terminal: bool) -> Self {
        Self {
            ready: false,
            terminal,
            reason,
            content_hash: None,
            latest_assistant_text_len: 0,
        }
    }

    pub fn with_hash(mut self, content_hash: Option<String>, text_len: usize) -> Self {
        self.content_hash = content_hash;
        self.latest_assistant_text_len = text_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_id_carries_platform_prefix() {
        let id = AttemptId::mint(Provider::Gemini);
        assert!(id.as_str().starts_with("gemini:"));
        assert_eq!(id.provider(), Provider::Gemini);
    }

    #[test]
    fn attempt_id_without_prefix_is_unknown() {
        let id = AttemptId::from("bare-id");
        assert_eq!(id.provider(), Provider::Unknown);
    }

    #[test]
    fn export_meta_gating() {
        assert!(ExportMeta::canonical().is_canonical_high());
        assert!(ExportMeta::canonical().is_complete_canonical());
        assert!(!ExportMeta::degraded().is_canonical_high());

        // A partial canonical capture may be sampled but not short-circuit.
        let partial = ExportMeta {
            completeness: Completeness::Partial,
            ..ExportMeta::canonical()
        };
        assert!(partial.is_canonical_high());
        assert!(!partial.is_complete_canonical());
    }

    #[test]
    fn capture_source_wire_names() {
        let meta = ExportMeta::canonical();
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""captureSource":"canonical_api""#));
        assert!(json.contains(r#""fidelity":"high""#));
    }
}
