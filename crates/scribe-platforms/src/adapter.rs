use serde_json::Value;

use scribe_core::types::{PlatformReadiness, Provider, ReadinessReason};
use scribe_model::conversation::{
    message_text, message_text_raw, Conversation, ContentType, Role, Status,
};

/// A title learned from a provider's history/title endpoint.
///
/// Published as an event and applied on receipt by every cache that holds
/// the conversation; nothing mutates shared references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleUpdate {
    pub conversation_id: String,
    pub title: String,
}

/// What an adapter extracted from one intercepted payload.
#[derive(Debug, Clone)]
pub enum ParsedPayload {
    Conversation(Conversation),
    Titles(Vec<TitleUpdate>),
}

/// Common interface implemented by every platform adapter (ChatGPT, Gemini,
/// Grok). Implementations must be `Send + Sync` so they can be stored in an
/// [`AdapterRegistry`](crate::registry::AdapterRegistry) and shared across
/// tasks.
///
/// The required methods are the capability core; the defaulted ones are
/// optional capabilities callers must tolerate being absent.
pub trait PlatformAdapter: Send + Sync {
    /// Stable lowercase identifier, unique across registered adapters.
    fn name(&self) -> &str;

    fn provider(&self) -> Provider;

    /// Display name used in the common export (`llm` field).
    fn display_name(&self) -> &str;

    /// Whether a page URL belongs to this platform.
    fn is_platform_url(&self, url: &str) -> bool;

    /// Conversation id from the page URL, if the page shows one.
    fn extract_conversation_id(&self, page_url: &str) -> Option<String>;

    /// Conversation id from an API URL. Optional capability.
    fn extract_conversation_id_from_api_url(&self, _api_url: &str) -> Option<String> {
        None
    }

    /// Whether a request URL carries a conversation payload worth parsing.
    fn matches_api_endpoint(&self, url: &str) -> bool;

    /// Whether a request URL signals "stream is done; fetch the full JSON".
    /// Optional capability.
    fn is_completion_trigger(&self, _url: &str) -> bool {
        false
    }

    /// Parse an intercepted body into a canonical payload.
    ///
    /// Never propagates parse failures: unrecognized or malformed input
    /// yields `None`.
    fn parse_intercepted(&self, data: &Value, url: &str) -> Option<ParsedPayload>;

    fn evaluate_readiness(&self, conv: &Conversation) -> PlatformReadiness;

    /// Cheap structural check for "does this JSON look like a conversation
    /// payload". Optional capability.
    fn is_conversation_payload(&self, _payload: &Value) -> bool {
        false
    }

    /// Ordered candidate URLs for warm-fetch recovery. Optional capability;
    /// an empty list means the platform cannot be warm-fetched.
    fn build_api_urls(&self, _conversation_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn format_filename(&self, conv: &Conversation) -> String;

    /// Apply a published [`TitleUpdate`] to the adapter's own caches so
    /// future merges carry the new title. Optional capability.
    fn apply_title(&self, _conversation_id: &str, _title: &str) {}
}

/// Readiness rule shared by Gemini and Grok: the latest assistant message
/// by timestamp must be finished, close the turn, and carry text.
pub(crate) fn latest_assistant_readiness(conv: &Conversation) -> PlatformReadiness {
    let any_in_progress = conv
        .mapping
        .values()
        .filter_map(|n| n.message.as_ref())
        .any(|m| m.author.role == Role::Assistant && m.status == Status::InProgress);

    let Some(latest) = conv.latest_assistant() else {
        return PlatformReadiness::not_ready(ReadinessReason::AssistantMissing, !any_in_progress);
    };

    if latest.status == Status::InProgress {
        return PlatformReadiness::not_ready(ReadinessReason::AssistantInProgress, false);
    }

    let text = message_text(latest);
    let closes_turn =
        latest.status == Status::FinishedSuccessfully && latest.end_turn == Some(true);

    if closes_turn && !text.is_empty() {
        let len = text.chars().count();
        match conv.content_hash() {
            Some(hash) => PlatformReadiness::ready(hash, len),
            None => PlatformReadiness::not_ready(
                ReadinessReason::AssistantTextMissing,
                !any_in_progress,
            ),
        }
    } else if text.is_empty() {
        PlatformReadiness::not_ready(ReadinessReason::AssistantTextMissing, !any_in_progress)
    } else {
        PlatformReadiness::not_ready(
            ReadinessReason::AssistantLatestTextNotTerminalTurn,
            !any_in_progress,
        )
    }
}

/// ChatGPT rule: ANY finished text assistant message that closes the turn
/// makes the conversation ready; terminal iff no assistant is in progress.
/// Text is the untrimmed NFC concatenation here — whitespace counts.
pub(crate) fn any_terminal_assistant_readiness(conv: &Conversation) -> PlatformReadiness {
    let assistants: Vec<_> = conv
        .messages_by_time()
        .into_iter()
        .filter_map(|n| n.message.as_ref())
        .filter(|m| m.author.role == Role::Assistant)
        .collect();

    if assistants.is_empty() {
        return PlatformReadiness::not_ready(ReadinessReason::AssistantMissing, true);
    }
    if assistants.iter().any(|m| m.status == Status::InProgress) {
        return PlatformReadiness::not_ready(ReadinessReason::AssistantInProgress, false);
    }

    let terminal_texts: Vec<String> = assistants
        .iter()
        .filter(|m| {
            m.status == Status::FinishedSuccessfully
                && m.content.content_type == ContentType::Text
                && m.end_turn == Some(true)
        })
        .map(|m| message_text_raw(m))
        .collect();

    if let Some(text) = terminal_texts.iter().rev().find(|t| !t.is_empty()) {
        let len = text.chars().count();
        return match conv.content_hash() {
            Some(hash) => PlatformReadiness::ready(hash, len),
            None => PlatformReadiness::not_ready(ReadinessReason::AssistantTextMissing, true),
        };
    }

    if !terminal_texts.is_empty() {
        // A turn-closing message exists but its text is empty.
        PlatformReadiness::not_ready(ReadinessReason::AssistantTextMissing, true)
    } else {
        PlatformReadiness::not_ready(ReadinessReason::AssistantTextNotTerminalTurn, true)
    }
}

/// Filename-safe slug: lowercase alphanumerics with single dashes.
pub(crate) fn filename_slug(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len));
    let mut last_dash = true;
    for c in text.chars() {
        if out.len() >= max_len {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
