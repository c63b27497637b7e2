use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{
    any_terminal_assistant_readiness, filename_slug, ParsedPayload, PlatformAdapter,
};
use crate::sse::data_frames;
use scribe_core::types::{PlatformReadiness, Provider};
use scribe_model::conversation::{
    message_from_value, Conversation, MessageNode, ROOT_ID, UNKNOWN_MODEL_SLUG,
};
use scribe_model::title::{derive_title_from_first_user, is_generic_title};

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

/// Conversation-level metadata preserved verbatim when the payload has it.
const PRESERVED_KEYS: &[&str] = &[
    "moderation_results",
    "plugin_ids",
    "gizmo_id",
    "gizmo_type",
    "is_archived",
    "safe_urls",
    "blocked_urls",
];

/// ChatGPT adapter: JSON conversation payloads (optionally wrapped) and SSE
/// streams folded into a linear chain.
pub struct ChatgptAdapter {
    page_re: Regex,
    api_re: Regex,
    completion_re: Regex,
}

impl ChatgptAdapter {
    pub fn new() -> Self {
        Self {
            page_re: Regex::new(&format!(
                r"^https://(?:chatgpt\.com|chat\.openai\.com)/(?:g/[^/]+/)?c/({UUID_PATTERN})(?:[/?#]|$)"
            ))
            .expect("static regex"),
            api_re: Regex::new(&format!(
                r"/backend-api(?:/[a-z]+)?/conversation/({UUID_PATTERN})(?:[/?#]|$)"
            ))
            .expect("static regex"),
            completion_re: Regex::new(r"/backend-api(?:/[a-z]+)?/conversation(?:[?#]|$)")
                .expect("static regex"),
        }
    }

    fn parse_sse(&self, transcript: &str, url: &str) -> Option<Conversation> {
        let frames = data_frames(transcript);
        if frames.is_empty() {
            return None;
        }

        let parsed: Vec<Value> = frames
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect();

        // A frame carrying a full conversation object wins outright.
        for frame in &parsed {
            if frame.get("mapping").map_or(false, Value::is_object) {
                if let Some(conv) = conversation_from_value(frame) {
                    return Some(conv);
                }
            }
        }

        // Otherwise fold message snapshots into a linear chain from root,
        // preserving first-seen order; repeated ids replace in place.
        let mut conversation_id: Option<String> = None;
        let mut title: Option<String> = None;
        let mut model_slug: Option<String> = None;
        let mut conv = Conversation::new("pending");
        let mut tail = ROOT_ID.to_string();

        for frame in &parsed {
            let Some(obj) = frame.as_object() else {
                continue;
            };
            if let Some(id) = obj.get("conversation_id").and_then(Value::as_str) {
                if !id.is_empty() {
                    conversation_id = Some(id.to_string());
                }
            }
            if let Some(t) = obj.get("title").and_then(Value::as_str) {
                title = Some(t.to_string());
            }
            if model_slug.is_none() {
                model_slug = extract_model_slug(obj);
            }
            let Some(message) = obj.get("message").and_then(message_from_value) else {
                continue;
            };
            if conv.mapping.contains_key(&message.id) {
                if let Some(node) = conv.mapping.get_mut(&message.id) {
                    node.message = Some(message);
                }
            } else {
                tail = conv.add_message(&tail, message);
            }
        }

        let conversation_id =
            conversation_id.or_else(|| self.extract_conversation_id_from_api_url(url))?;
        conv.conversation_id = conversation_id;
        conv.current_node = tail;
        conv.ensure_current_node();
        conv.derive_times();
        conv.title = title.unwrap_or_default();
        if is_generic_title(&conv.title) {
            if let Some(derived) = derive_title_from_first_user(&conv) {
                conv.title = derived;
            }
        }
        if let Some(slug) = model_slug {
            conv.default_model_slug = slug;
        }
        Some(conv)
    }
}

impl Default for ChatgptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for ChatgptAdapter {
    fn name(&self) -> &str {
        "chatgpt"
    }

    fn provider(&self) -> Provider {
        Provider::Chatgpt
    }

    fn display_name(&self) -> &str {
        "ChatGPT"
    }

    fn is_platform_url(&self, url: &str) -> bool {
        url.starts_with("https://chatgpt.com/") || url.starts_with("https://chat.openai.com/")
    }

    fn extract_conversation_id(&self, page_url: &str) -> Option<String> {
        self.page_re
            .captures(page_url)
            .map(|c| c[1].to_lowercase())
    }

    fn extract_conversation_id_from_api_url(&self, api_url: &str) -> Option<String> {
        self.api_re.captures(api_url).map(|c| c[1].to_lowercase())
    }

    fn matches_api_endpoint(&self, url: &str) -> bool {
        self.api_re.is_match(url)
    }

    fn is_completion_trigger(&self, url: &str) -> bool {
        self.completion_re.is_match(url)
    }

    fn parse_intercepted(&self, data: &Value, url: &str) -> Option<ParsedPayload> {
        let conv = match data {
            Value::String(text) => {
                let from_sse = text
                    .contains("data:")
                    .then(|| self.parse_sse(text, url))
                    .flatten();
                from_sse.or_else(|| {
                    let value: Value = serde_json::from_str(text).ok()?;
                    unwrap_conversation(&value).and_then(conversation_from_value)
                })
            }
            Value::Object(_) => unwrap_conversation(data).and_then(conversation_from_value),
            _ => None,
        };
        match conv {
            Some(conv) => Some(ParsedPayload::Conversation(conv)),
            None => {
                debug!(%url, "unrecognized chatgpt payload");
                None
            }
        }
    }

    fn evaluate_readiness(&self, conv: &Conversation) -> PlatformReadiness {
        any_terminal_assistant_readiness(conv)
    }

    fn is_conversation_payload(&self, payload: &Value) -> bool {
        unwrap_conversation(payload)
            .map(|v| v.get("mapping").map_or(false, Value::is_object))
            .unwrap_or(false)
    }

    fn build_api_urls(&self, conversation_id: &str) -> Vec<String> {
        vec![
            format!("https://chatgpt.com/backend-api/conversation/{conversation_id}"),
            format!("https://chat.openai.com/backend-api/conversation/{conversation_id}"),
        ]
    }

    fn format_filename(&self, conv: &Conversation) -> String {
        let slug = filename_slug(&conv.title, 48);
        let short_id: String = conv.conversation_id.chars().take(8).collect();
        if slug.is_empty() {
            format!("chatgpt-{short_id}.json")
        } else {
            format!("chatgpt-{slug}-{short_id}.json")
        }
    }
}

/// Peel `{conversation: …}` and `{data: {conversation: …}}` wrappers.
fn unwrap_conversation(value: &Value) -> Option<&Value> {
    if !value.is_object() {
        return None;
    }
    if let Some(inner) = value.get("conversation") {
        if inner.is_object() {
            return Some(inner);
        }
    }
    if let Some(inner) = value.get("data").and_then(|d| d.get("conversation")) {
        if inner.is_object() {
            return Some(inner);
        }
    }
    Some(value)
}

fn extract_model_slug(frame: &serde_json::Map<String, Value>) -> Option<String> {
    let from_message = frame.get("message").and_then(|m| {
        let meta = m.get("metadata")?;
        ["resolved_model_slug", "model_slug", "model"]
            .iter()
            .find_map(|k| meta.get(k).and_then(Value::as_str))
    });
    from_message
        .or_else(|| frame.get("model_slug").and_then(Value::as_str))
        .filter(|s| !s.is_empty() && *s != "auto")
        .map(str::to_string)
}

/// Tolerant construction of a canonical conversation from a full payload.
///
/// Repairs what it can: the parentless node becomes `root`, stray parents
/// fall back to root, dangling child links are dropped, and a bad
/// `current_node` is re-derived from message timestamps.
pub(crate) fn conversation_from_value(value: &Value) -> Option<Conversation> {
    let obj = value.as_object()?;
    let conversation_id = obj
        .get("conversation_id")
        .or_else(|| obj.get("id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_string();

    let mut conv = Conversation::new(conversation_id);

    if let Some(mapping) = obj.get("mapping").and_then(Value::as_object) {
        let mut seq = 1u64;
        // First pass: materialize every node.
        for (id, raw_node) in mapping {
            if id == ROOT_ID {
                continue;
            }
            let parent = raw_node
                .get("parent")
                .and_then(Value::as_str)
                .map(str::to_string);
            let children: Vec<String> = raw_node
                .get("children")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let message = raw_node.get("message").and_then(message_from_value);
            conv.mapping.insert(
                id.clone(),
                MessageNode {
                    id: id.clone(),
                    parent,
                    children,
                    message,
                    seq,
                },
            );
            seq += 1;
        }

        // Second pass: the provider's parentless node folds into our root;
        // every other parent reference must resolve or fall back to root.
        let ids: Vec<String> = conv
            .mapping
            .keys()
            .filter(|id| *id != ROOT_ID)
            .cloned()
            .collect();
        for id in &ids {
            let parent = conv.mapping.get(id).and_then(|n| n.parent.clone());
            let resolved = match parent {
                None => None,
                Some(p) if p != ROOT_ID && !conv.mapping.contains_key(&p) => None,
                Some(p) => Some(p),
            };
            match resolved {
                None => {
                    // Parentless provider node (its own root) hangs off our
                    // synthetic root so the single-root invariant holds.
                    if let Some(node) = conv.mapping.get_mut(id) {
                        node.parent = Some(ROOT_ID.to_string());
                    }
                    if let Some(root) = conv.mapping.get_mut(ROOT_ID) {
                        if !root.children.contains(id) {
                            root.children.push(id.clone());
                        }
                    }
                }
                Some(p) => {
                    if let Some(node) = conv.mapping.get_mut(id) {
                        node.parent = Some(p.clone());
                    }
                    if let Some(parent_node) = conv.mapping.get_mut(&p) {
                        if !parent_node.children.contains(id) {
                            parent_node.children.push(id.clone());
                        }
                    }
                }
            }
        }
        // Drop dangling child links.
        let known: std::collections::BTreeSet<String> = conv.mapping.keys().cloned().collect();
        for node in conv.mapping.values_mut() {
            node.children.retain(|c| known.contains(c));
        }
    }

    conv.title = obj
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    conv.create_time = obj.get("create_time").and_then(Value::as_f64);
    conv.update_time = obj.get("update_time").and_then(Value::as_f64);
    conv.current_node = obj
        .get("current_node")
        .and_then(Value::as_str)
        .unwrap_or(ROOT_ID)
        .to_string();
    conv.ensure_current_node();
    conv.derive_times();

    if let Some(slug) = obj
        .get("default_model_slug")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty() && *s != "auto")
    {
        conv.default_model_slug = slug.to_string();
    } else {
        conv.default_model_slug = UNKNOWN_MODEL_SLUG.to_string();
    }

    for key in PRESERVED_KEYS {
        if let Some(v) = obj.get(*key) {
            conv.extra.insert((*key).to_string(), v.clone());
        }
    }

    if is_generic_title(&conv.title) {
        if let Some(derived) = derive_title_from_first_user(&conv) {
            conv.title = derived;
        }
    }

    Some(conv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_model::conversation::{message_text, Role};
    use serde_json::json;

    const CONV_ID: &str = "0a1b2c3d-1111-2222-3333-444455556666";

    fn adapter() -> ChatgptAdapter {
        ChatgptAdapter::new()
    }

    #[test]
    fn extracts_id_from_page_urls() {
        let a = adapter();
        assert_eq!(
            a.extract_conversation_id(&format!("https://chatgpt.com/c/{CONV_ID}")),
            Some(CONV_ID.to_string())
        );
        assert_eq!(
            a.extract_conversation_id(&format!(
                "https://chat.openai.com/g/g-abc123/c/{CONV_ID}?model=auto"
            )),
            Some(CONV_ID.to_string())
        );
        assert_eq!(a.extract_conversation_id("https://chatgpt.com/c/not-a-uuid"), None);
        assert_eq!(a.extract_conversation_id("https://example.com/c/0a1b2c3d-1111-2222-3333-444455556666"), None);
    }

    #[test]
    fn api_endpoint_and_completion_trigger() {
        let a = adapter();
        assert!(a.matches_api_endpoint(&format!(
            "https://chatgpt.com/backend-api/conversation/{CONV_ID}"
        )));
        assert!(!a.matches_api_endpoint("https://chatgpt.com/backend-api/conversation"));
        assert!(a.is_completion_trigger("https://chatgpt.com/backend-api/conversation"));
        assert!(a.is_completion_trigger("https://chatgpt.com/backend-api/f/conversation"));
    }

    #[test]
    fn parses_wrapped_json_payload() {
        let a = adapter();
        let payload = json!({
            "data": {
                "conversation": {
                    "conversation_id": "abc",
                    "title": "Real Title",
                    "current_node": "m2",
                    "default_model_slug": "gpt-5",
                    "is_archived": false,
                    "mapping": {
                        "base": {"id": "base", "parent": null, "children": ["m1"], "message": null},
                        "m1": {"id": "m1", "parent": "base", "children": ["m2"], "message": {
                            "id": "m1",
                            "author": {"role": "user"},
                            "content": {"content_type": "text", "parts": ["hi"]},
                            "status": "finished_successfully",
                            "end_turn": true,
                            "create_time": 100.0
                        }},
                        "m2": {"id": "m2", "parent": "m1", "children": [], "message": {
                            "id": "m2",
                            "author": {"role": "assistant"},
                            "content": {"content_type": "text", "parts": ["hello"]},
                            "status": "finished_successfully",
                            "end_turn": true,
                            "create_time": 101.0
                        }}
                    }
                }
            }
        });
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(&payload, "https://chatgpt.com/backend-api/conversation/x")
            .unwrap()
        else {
            panic!("expected conversation");
        };
        assert_eq!(conv.conversation_id, "abc");
        assert_eq!(conv.title, "Real Title");
        assert_eq!(conv.current_node, "m2");
        assert_eq!(conv.default_model_slug, "gpt-5");
        assert_eq!(conv.extra.get("is_archived"), Some(&json!(false)));
        conv.validate().unwrap();

        let readiness = a.evaluate_readiness(&conv);
        assert!(readiness.ready);
        assert!(readiness.terminal);
        assert_eq!(readiness.latest_assistant_text_len, 5);
    }

    #[test]
    fn sse_fold_builds_linear_chain() {
        // S1: a user frame and an assistant thoughts frame carrying the
        // resolved model slug; title placeholder replaced by the prompt.
        let a = adapter();
        let sse = format!(
            concat!(
                "data: {{\"conversation_id\":\"{id}\",\"title\":\"New chat\"}}\n\n",
                "data: {{\"message\":{{\"id\":\"u1\",\"author\":{{\"role\":\"user\"}},",
                "\"content\":{{\"content_type\":\"text\",\"parts\":[\"What is calibration?\"]}},",
                "\"status\":\"finished_successfully\",\"end_turn\":true,\"create_time\":1.0}}}}\n\n",
                "data: {{\"message\":{{\"id\":\"a1\",\"author\":{{\"role\":\"assistant\"}},",
                "\"content\":{{\"content_type\":\"thoughts\",\"thoughts\":[{{\"content\":\"hmm\"}}]}},",
                "\"status\":\"finished_successfully\",\"create_time\":2.0,",
                "\"metadata\":{{\"resolved_model_slug\":\"gpt-5-t-mini\"}}}}}}\n\n",
                "data: [DONE]\n"
            ),
            id = CONV_ID
        );
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(
                &Value::String(sse),
                "https://chatgpt.com/backend-api/conversation",
            )
            .unwrap()
        else {
            panic!("expected conversation");
        };
        assert_eq!(conv.conversation_id, CONV_ID);
        assert_eq!(conv.title, "What is calibration?");
        assert_eq!(conv.default_model_slug, "gpt-5-t-mini");
        conv.validate().unwrap();

        // Chain hangs off root in first-seen order.
        assert_eq!(conv.mapping[ROOT_ID].children, vec!["u1"]);
        assert_eq!(conv.mapping["u1"].children, vec!["a1"]);
    }

    #[test]
    fn sse_repeated_message_id_replaces_in_place() {
        let a = adapter();
        let sse = format!(
            concat!(
                "data: {{\"conversation_id\":\"{id}\",\"message\":{{\"id\":\"a1\",",
                "\"author\":{{\"role\":\"assistant\"}},\"content\":{{\"content_type\":\"text\",",
                "\"parts\":[\"partial\"]}},\"status\":\"in_progress\"}}}}\n\n",
                "data: {{\"message\":{{\"id\":\"a1\",\"author\":{{\"role\":\"assistant\"}},",
                "\"content\":{{\"content_type\":\"text\",\"parts\":[\"complete answer\"]}},",
                "\"status\":\"finished_successfully\",\"end_turn\":true}}}}\n\n",
                "data: [DONE]\n"
            ),
            id = CONV_ID
        );
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(&Value::String(sse), "https://chatgpt.com/x")
            .unwrap()
        else {
            panic!("expected conversation");
        };
        let msg = conv.mapping["a1"].message.as_ref().unwrap();
        assert_eq!(message_text(msg), "complete answer");
        assert_eq!(conv.mapping.values().filter(|n| n.message.is_some()).count(), 1);
    }

    #[test]
    fn sse_frame_with_full_conversation_wins() {
        let a = adapter();
        let sse = concat!(
            "data: {\"conversation_id\":\"full-1\",\"title\":\"T\",\"current_node\":\"m1\",",
            "\"mapping\":{\"r\":{\"id\":\"r\",\"parent\":null,\"children\":[\"m1\"],\"message\":null},",
            "\"m1\":{\"id\":\"m1\",\"parent\":\"r\",\"children\":[],\"message\":{\"id\":\"m1\",",
            "\"author\":{\"role\":\"assistant\"},\"content\":{\"content_type\":\"text\",",
            "\"parts\":[\"x\"]},\"status\":\"finished_successfully\",\"end_turn\":true}}}}\n\n",
            "data: [DONE]\n"
        );
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(&Value::String(sse.to_string()), "https://chatgpt.com/x")
            .unwrap()
        else {
            panic!("expected conversation");
        };
        assert_eq!(conv.conversation_id, "full-1");
        // The provider's parentless node folded into our synthetic root.
        conv.validate().unwrap();
        assert_eq!(conv.mapping["m1"].parent.as_deref(), Some("r"));
        assert_eq!(conv.mapping["r"].parent.as_deref(), Some(ROOT_ID));
    }

    #[test]
    fn truncated_sse_without_done_still_parses() {
        let a = adapter();
        let sse = format!(
            "data: {{\"conversation_id\":\"{CONV_ID}\",\"message\":{{\"id\":\"u1\",\"author\":{{\"role\":\"user\"}},\"content\":{{\"content_type\":\"text\",\"parts\":[\"q\"]}}}}}}\n"
        );
        assert!(a
            .parse_intercepted(&Value::String(sse), "https://chatgpt.com/x")
            .is_some());
    }

    #[test]
    fn garbage_returns_none() {
        let a = adapter();
        assert!(a
            .parse_intercepted(&Value::String("not json at all".into()), "u")
            .is_none());
        assert!(a.parse_intercepted(&json!(42), "u").is_none());
        assert!(a
            .parse_intercepted(&Value::String("data: [DONE]\n".into()), "u")
            .is_none());
    }

    #[test]
    fn readiness_requires_terminal_turn() {
        let a = adapter();
        let payload = json!({
            "conversation_id": "c",
            "mapping": {
                "m1": {"id": "m1", "parent": null, "children": [], "message": {
                    "id": "m1",
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["text"]},
                    "status": "finished_successfully",
                    "end_turn": false
                }}
            },
            "current_node": "m1"
        });
        let ParsedPayload::Conversation(conv) = a.parse_intercepted(&payload, "u").unwrap() else {
            panic!();
        };
        let readiness = a.evaluate_readiness(&conv);
        assert!(!readiness.ready);
        assert!(readiness.terminal);
        assert_eq!(
            readiness.reason,
            scribe_core::types::ReadinessReason::AssistantTextNotTerminalTurn
        );
    }

    #[test]
    fn filename_uses_title_slug() {
        let a = adapter();
        let mut conv = Conversation::new("abcd1234-rest");
        conv.title = "What is calibration?".to_string();
        assert_eq!(a.format_filename(&conv), "chatgpt-what-is-calibration-abcd1234.json");
    }
}
