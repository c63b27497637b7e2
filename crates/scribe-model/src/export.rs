use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{message_text, ContentType, Conversation, Message, Role};

/// Provider-agnostic flat "latest turn" export shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonExport {
    pub format: String,
    pub llm: String,
    pub model: String,
    pub title: String,
    pub conversation_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub prompt: String,
    pub response: String,
    pub reasoning: Vec<String>,
}

impl CommonExport {
    /// Flatten the canonical document into the latest user/assistant pair.
    pub fn from_conversation(conv: &Conversation, llm_display_name: &str) -> Self {
        let path = conv.current_path();
        let messages: Vec<&Message> = path.iter().filter_map(|n| n.message.as_ref()).collect();

        // Walk back from the tip: the trailing assistant group is the
        // response; the first user message above it is the prompt.
        let mut response = String::new();
        let mut recap_fallback: Option<String> = None;
        let mut prompt = String::new();
        let mut latest_assistant: Option<&Message> = None;

        let mut idx = messages.len();
        while idx > 0 {
            idx -= 1;
            let m = messages[idx];
            match m.author.role {
                Role::Assistant => {
                    if latest_assistant.is_none() {
                        latest_assistant = Some(m);
                    }
                    if m.content.content_type == ContentType::ReasoningRecap {
                        if let Some(c) = &m.content.content {
                            if recap_fallback.is_none() && !c.trim().is_empty() {
                                recap_fallback = Some(c.trim().to_string());
                            }
                        }
                    } else if m.content.content_type == ContentType::Text && response.is_empty() {
                        response = message_text(m);
                    }
                }
                Role::User => {
                    prompt = message_text(m);
                    break;
                }
                Role::System | Role::Tool => {}
            }
        }

        // A turn that ended on a reasoning recap has no text message; the
        // recap content stands in as the response.
        if response.is_empty() {
            if let Some(recap) = &recap_fallback {
                response = recap.clone();
            }
        }

        let mut reasoning = collect_reasoning(&messages);
        if let Some(recap) = recap_fallback {
            if !reasoning.contains(&recap) {
                reasoning.push(recap);
            }
        }

        Self {
            format: "common".to_string(),
            llm: llm_display_name.to_string(),
            model: resolve_model_slug(latest_assistant, conv),
            title: conv.title.clone(),
            conversation_id: conv.conversation_id.clone(),
            created_at: iso8601(conv.create_time),
            updated_at: iso8601(conv.update_time),
            prompt,
            response,
            reasoning,
        }
    }
}

/// Ordered, deduplicated reasoning text from the current path.
///
/// Per-message precedence: `content.thoughts[].content`, else a
/// `reasoning_recap`'s content, else `metadata.reasoning`, else
/// `metadata.thinking_trace`. Empty strings are dropped.
fn collect_reasoning(messages: &[&Message]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|e| e == s) {
            out.push(s.to_string());
        }
    };

    for m in messages {
        if m.author.role != Role::Assistant {
            continue;
        }
        if let Some(thoughts) = &m.content.thoughts {
            if !thoughts.is_empty() {
                for t in thoughts {
                    push(&t.content);
                }
                continue;
            }
        }
        if m.content.content_type == ContentType::ReasoningRecap {
            if let Some(c) = &m.content.content {
                push(c);
                continue;
            }
        }
        if let Some(r) = m.metadata.get("reasoning").and_then(Value::as_str) {
            push(r);
            continue;
        }
        if let Some(r) = m.metadata.get("thinking_trace").and_then(Value::as_str) {
            push(r);
        }
    }
    out
}

/// Latest-assistant metadata wins over the conversation default; `"auto"`
/// and empty count as absent at every step.
fn resolve_model_slug(latest_assistant: Option<&Message>, conv: &Conversation) -> String {
    let from_meta = latest_assistant.and_then(|m| {
        ["resolved_model_slug", "model_slug", "model"]
            .iter()
            .find_map(|key| m.metadata.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .filter(|s| is_usable_slug(s))
    });
    from_meta.unwrap_or_else(|| {
        if is_usable_slug(&conv.default_model_slug) {
            conv.default_model_slug.clone()
        } else {
            "unknown".to_string()
        }
    })
}

fn is_usable_slug(s: &str) -> bool {
    !s.is_empty() && s != "auto"
}

fn iso8601(seconds: Option<f64>) -> String {
    let Some(secs) = seconds else {
        return String::new();
    };
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    chrono::DateTime::from_timestamp(whole, nanos)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
