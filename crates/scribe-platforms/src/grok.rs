use std::sync::Mutex;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{
    filename_slug, latest_assistant_readiness, ParsedPayload, PlatformAdapter, TitleUpdate,
};
use scribe_core::bounded::BoundedMap;
use scribe_core::config::{DEFAULT_ACTIVE_CONVERSATION_CAP, DEFAULT_TITLE_CACHE_CAP};
use scribe_core::types::{PlatformReadiness, Provider};
use scribe_model::conversation::{Author, Content, Conversation, Message, Role, Status, ROOT_ID};
use scribe_model::title::is_generic_title;

const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

/// Which grok.com endpoint family a URL belongs to. Each one is a partial
/// update against the same active conversation.
#[derive(Debug, PartialEq, Eq)]
enum GrokEndpoint {
    XItems,
    XHistory,
    Meta(String),
    ResponseNode(String),
    LoadResponses(String),
}

/// Grok adapter covering both hosts: x.com GraphQL (numeric rest ids) and
/// grok.com REST (UUID ids, three partial-update endpoint families).
pub struct GrokAdapter {
    x_graphql_re: Regex,
    x_page_re: Regex,
    numeric_re: Regex,
    grokcom_page_re: Regex,
    meta_re: Regex,
    response_node_re: Regex,
    load_responses_re: Regex,
    send_re: Regex,
    state: Mutex<GrokState>,
}

struct GrokState {
    active: BoundedMap<String, Conversation>,
    titles: BoundedMap<String, String>,
}

impl GrokAdapter {
    pub fn new() -> Self {
        Self {
            x_graphql_re: Regex::new(
                r"^https://(?:x|twitter)\.com/i/api/graphql/[^/]+/(GrokConversationItemsByRestId|GrokHistory)",
            )
            .expect("static regex"),
            x_page_re: Regex::new(r"[?&]conversation=([0-9]{10,20})").expect("static regex"),
            numeric_re: Regex::new(r"([0-9]{10,20})").expect("static regex"),
            grokcom_page_re: Regex::new(&format!(r"^https://grok\.com/c/({UUID_PATTERN})"))
                .expect("static regex"),
            meta_re: Regex::new(&format!(
                r"/rest/app-chat/conversations_v2/({UUID_PATTERN})(?:[/?#]|$)"
            ))
            .expect("static regex"),
            response_node_re: Regex::new(&format!(
                r"/rest/app-chat/conversations/({UUID_PATTERN})/response-node"
            ))
            .expect("static regex"),
            load_responses_re: Regex::new(&format!(
                r"/rest/app-chat/conversations/({UUID_PATTERN})/load-responses"
            ))
            .expect("static regex"),
            send_re: Regex::new(&format!(
                r"/rest/app-chat/conversations/(?:new|({UUID_PATTERN})/responses)(?:[?#]|$)"
            ))
            .expect("static regex"),
            state: Mutex::new(GrokState {
                active: BoundedMap::new(DEFAULT_ACTIVE_CONVERSATION_CAP),
                titles: BoundedMap::new(DEFAULT_TITLE_CACHE_CAP),
            }),
        }
    }

    fn classify(&self, url: &str) -> Option<GrokEndpoint> {
        if let Some(caps) = self.x_graphql_re.captures(url) {
            return Some(match &caps[1] {
                "GrokConversationItemsByRestId" => GrokEndpoint::XItems,
                _ => GrokEndpoint::XHistory,
            });
        }
        if let Some(caps) = self.meta_re.captures(url) {
            return Some(GrokEndpoint::Meta(caps[1].to_lowercase()));
        }
        if let Some(caps) = self.response_node_re.captures(url) {
            return Some(GrokEndpoint::ResponseNode(caps[1].to_lowercase()));
        }
        if let Some(caps) = self.load_responses_re.captures(url) {
            return Some(GrokEndpoint::LoadResponses(caps[1].to_lowercase()));
        }
        None
    }

    /// x.com reuses `chat_item_id` across conversations, so the rest id
    /// from the URL `variables` JSON is authoritative; a bare numeric id in
    /// the URL is the fallback.
    fn rest_id_from_url(&self, url: &str) -> Option<String> {
        if let Some(query) = url.split_once('?').map(|(_, q)| q) {
            for pair in query.split('&') {
                if let Some(raw) = pair.strip_prefix("variables=") {
                    if let Ok(decoded) = urlencoding::decode(raw) {
                        if let Ok(vars) = serde_json::from_str::<Value>(&decoded) {
                            if let Some(id) = vars.get("restId").and_then(Value::as_str) {
                                return Some(id.to_string());
                            }
                        }
                    }
                }
            }
        }
        self.numeric_re
            .captures(url)
            .map(|c| c[1].to_string())
    }

    fn ingest_x_items(&self, body: &Value, url: &str) -> Option<Conversation> {
        let rest_id = self.rest_id_from_url(url)?;
        let items = find_grok_items(body)?;

        let mut state = self.state.lock().unwrap();
        let mut conv = Conversation::new(rest_id.clone());
        let mut tail = ROOT_ID.to_string();
        for item in items {
            let Some(text) = item.get("message").and_then(Value::as_str) else {
                continue;
            };
            let role = match item
                .get("sender_type")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .as_deref()
            {
                Some("user") => Role::User,
                _ => Role::Assistant,
            };
            let id = item
                .get("chat_item_id")
                .and_then(item_id)
                .unwrap_or_else(|| format!("item-{}", conv.mapping.len()));
            let create_time = item
                .get("created_at_ms")
                .and_then(Value::as_f64)
                .map(|ms| ms / 1000.0);
            let message = Message {
                id: id.clone(),
                author: Author {
                    role,
                    name: None,
                    metadata: Value::Null,
                },
                content: Content::text(vec![text.to_string()]),
                status: Status::FinishedSuccessfully,
                end_turn: Some(true),
                create_time,
                update_time: create_time,
                metadata: item.get("metadata").cloned().unwrap_or(Value::Null),
            };
            tail = conv.add_message(&tail, message);
        }
        conv.current_node = tail;
        conv.ensure_current_node();
        conv.derive_times();
        if let Some(title) = state.titles.get(&rest_id) {
            conv.title = title.clone();
        }
        state.active.insert(rest_id, conv.clone());
        Some(conv)
    }

    fn ingest_x_history(&self, body: &Value) -> Vec<TitleUpdate> {
        let mut updates = Vec::new();
        let mut state = self.state.lock().unwrap();
        collect_history_titles(body, &mut |id: String, title: String| {
            state.titles.insert(id.clone(), title.clone());
            if let Some(conv) = state.active.get_mut(&id) {
                conv.title = title.clone();
            }
            updates.push(TitleUpdate {
                conversation_id: id,
                title,
            });
        });
        updates
    }

    fn with_active(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Conversation),
    ) -> Conversation {
        let mut state = self.state.lock().unwrap();
        let mut conv = state
            .active
            .get(&id.to_string())
            .cloned()
            .unwrap_or_else(|| Conversation::new(id));
        apply(&mut conv);
        if is_generic_title(&conv.title) {
            if let Some(title) = state.titles.get(&id.to_string()) {
                conv.title = title.clone();
            }
        }
        state.active.insert(id.to_string(), conv.clone());
        conv
    }

    /// `conversations_v2/{id}` — conversation meta (title, times).
    fn ingest_meta(&self, id: &str, body: &Value) -> Conversation {
        self.with_active(id, |conv| {
            let source = body.get("conversation").unwrap_or(body);
            if let Some(title) = source.get("title").and_then(Value::as_str) {
                if !title.is_empty() {
                    conv.title = title.to_string();
                }
            }
            if let Some(t) = time_value(source.get("createTime").or_else(|| source.get("create_time"))) {
                conv.create_time = Some(t);
            }
            if let Some(t) = time_value(source.get("modifyTime").or_else(|| source.get("modify_time"))) {
                conv.update_time = Some(t);
            }
        })
    }

    /// `{id}/response-node` — tree shape. Links must reparent cleanly.
    fn ingest_response_nodes(&self, id: &str, body: &Value) -> Conversation {
        self.with_active(id, |conv| {
            let Some(nodes) = find_object_array(body, &["responseNodes", "response_nodes", "nodes"])
            else {
                return;
            };
            for node in nodes {
                let Some(response_id) = node
                    .get("responseId")
                    .or_else(|| node.get("response_id"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let parent = node
                    .get("parentResponseId")
                    .or_else(|| node.get("parent_response_id"))
                    .and_then(Value::as_str)
                    .unwrap_or(ROOT_ID);
                conv.reparent(response_id, parent);
            }
            conv.current_node = conv
                .latest_message_id()
                .unwrap_or_else(|| ROOT_ID.to_string());
        })
    }

    /// `{id}/load-responses` — message bodies, possibly NDJSON.
    fn ingest_load_responses(&self, id: &str, body: &Value) -> Option<Conversation> {
        let responses = find_object_array(body, &["responses", "items"])?;
        let conv = self.with_active(id, |conv| {
            for resp in &responses {
                let Some(response_id) = resp
                    .get("responseId")
                    .or_else(|| resp.get("response_id"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let Some(text) = resp.get("message").and_then(Value::as_str) else {
                    continue;
                };
                let role = match resp.get("sender").and_then(Value::as_str) {
                    Some("human") => Role::User,
                    _ => Role::Assistant,
                };
                let partial = resp
                    .get("partial")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let create_time = time_value(
                    resp.get("createTime").or_else(|| resp.get("create_time")),
                );
                let message = Message {
                    id: response_id.to_string(),
                    author: Author {
                        role,
                        name: None,
                        metadata: Value::Null,
                    },
                    content: Content::text(vec![text.to_string()]),
                    status: if partial {
                        Status::InProgress
                    } else {
                        Status::FinishedSuccessfully
                    },
                    end_turn: if partial { None } else { Some(true) },
                    create_time,
                    update_time: create_time,
                    metadata: Value::Null,
                };
                if let Some(node) = conv.mapping.get_mut(response_id) {
                    node.message = Some(message);
                } else {
                    conv.add_message(ROOT_ID, message);
                }
                if let Some(model) = resp
                    .get("model")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty() && *m != "auto")
                {
                    conv.default_model_slug = model.to_lowercase();
                }
            }
            conv.current_node = conv
                .latest_message_id()
                .unwrap_or_else(|| ROOT_ID.to_string());
            conv.derive_times();
        });
        Some(conv)
    }
}

impl Default for GrokAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for GrokAdapter {
    fn name(&self) -> &str {
        "grok"
    }

    fn provider(&self) -> Provider {
        Provider::Grok
    }

    fn display_name(&self) -> &str {
        "Grok"
    }

    fn is_platform_url(&self, url: &str) -> bool {
        url.starts_with("https://grok.com/")
            || url.starts_with("https://x.com/i/grok")
            || url.starts_with("https://twitter.com/i/grok")
    }

    fn extract_conversation_id(&self, page_url: &str) -> Option<String> {
        if let Some(caps) = self.grokcom_page_re.captures(page_url) {
            return Some(caps[1].to_lowercase());
        }
        self.x_page_re
            .captures(page_url)
            .map(|c| c[1].to_string())
    }

    fn extract_conversation_id_from_api_url(&self, api_url: &str) -> Option<String> {
        match self.classify(api_url) {
            Some(GrokEndpoint::Meta(id))
            | Some(GrokEndpoint::ResponseNode(id))
            | Some(GrokEndpoint::LoadResponses(id)) => Some(id),
            Some(GrokEndpoint::XItems) => self.rest_id_from_url(api_url),
            Some(GrokEndpoint::XHistory) => None,
            None => self
                .send_re
                .captures(api_url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_lowercase()),
        }
    }

    fn matches_api_endpoint(&self, url: &str) -> bool {
        self.classify(url).is_some()
    }

    /// grok.com prompt sends: `conversations/new` and
    /// `conversations/{id}/responses`. Their streamed bodies are not
    /// conversation payloads; completion means "go fetch load-responses".
    fn is_completion_trigger(&self, url: &str) -> bool {
        self.send_re.is_match(url)
    }

    fn parse_intercepted(&self, data: &Value, url: &str) -> Option<ParsedPayload> {
        let endpoint = self.classify(url)?;
        let body = decode_body(data)?;
        let parsed = match endpoint {
            GrokEndpoint::XItems => self
                .ingest_x_items(&body, url)
                .map(ParsedPayload::Conversation),
            GrokEndpoint::XHistory => {
                let updates = self.ingest_x_history(&body);
                (!updates.is_empty()).then_some(ParsedPayload::Titles(updates))
            }
            GrokEndpoint::Meta(id) => Some(ParsedPayload::Conversation(self.ingest_meta(&id, &body))),
            GrokEndpoint::ResponseNode(id) => Some(ParsedPayload::Conversation(
                self.ingest_response_nodes(&id, &body),
            )),
            GrokEndpoint::LoadResponses(id) => self
                .ingest_load_responses(&id, &body)
                .map(ParsedPayload::Conversation),
        };
        if parsed.is_none() {
            debug!(%url, "unrecognized grok payload");
        }
        parsed
    }

    fn evaluate_readiness(&self, conv: &Conversation) -> PlatformReadiness {
        latest_assistant_readiness(conv)
    }

    fn build_api_urls(&self, conversation_id: &str) -> Vec<String> {
        if conversation_id.chars().all(|c| c.is_ascii_digit()) {
            // x.com GraphQL query hashes rotate per deploy; there is no
            // stable URL to warm-fetch.
            return Vec::new();
        }
        vec![
            format!(
                "https://grok.com/rest/app-chat/conversations/{conversation_id}/load-responses"
            ),
            format!(
                "https://grok.com/rest/app-chat/conversations/{conversation_id}/response-node"
            ),
            format!("https://grok.com/rest/app-chat/conversations_v2/{conversation_id}"),
        ]
    }

    fn format_filename(&self, conv: &Conversation) -> String {
        let slug = filename_slug(&conv.title, 48);
        let short_id: String = conv.conversation_id.chars().take(8).collect();
        if slug.is_empty() {
            format!("grok-{short_id}.json")
        } else {
            format!("grok-{slug}-{short_id}.json")
        }
    }

    fn apply_title(&self, conversation_id: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .titles
            .insert(conversation_id.to_string(), title.to_string());
        if let Some(conv) = state.active.get_mut(&conversation_id.to_string()) {
            conv.title = title.to_string();
        }
    }
}

/// Bodies arrive as JSON objects, JSON strings, or NDJSON lines.
fn decode_body(data: &Value) -> Option<Value> {
    match data {
        Value::Object(_) | Value::Array(_) => Some(data.clone()),
        Value::String(text) => {
            if let Ok(v) = serde_json::from_str::<Value>(text) {
                return Some(v);
            }
            // NDJSON: one JSON object per line.
            let lines: Vec<Value> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect();
            (!lines.is_empty()).then(|| Value::Array(lines))
        }
        _ => None,
    }
}

/// x.com wraps the items list a few levels deep; take the named path when
/// present, otherwise scan for an array of item-shaped objects.
fn find_grok_items(body: &Value) -> Option<Vec<Value>> {
    if let Some(items) = body
        .get("data")
        .and_then(|d| d.get("grok_conversation_items_by_rest_id"))
        .and_then(|g| g.get("items"))
        .and_then(Value::as_array)
    {
        return Some(items.clone());
    }
    find_array_where(body, &|v| {
        v.get("message").map_or(false, Value::is_string)
            && v.get("sender_type").is_some()
    })
}

fn collect_history_titles(body: &Value, visit: &mut impl FnMut(String, String)) {
    match body {
        Value::Array(arr) => {
            for item in arr {
                collect_history_titles(item, visit);
            }
        }
        Value::Object(obj) => {
            let id = obj
                .get("conversation_id")
                .or_else(|| obj.get("rest_id"))
                .and_then(item_id);
            let title = obj.get("title").and_then(Value::as_str);
            if let (Some(id), Some(title)) = (id, title) {
                if !title.is_empty() {
                    visit(id, title.to_string());
                }
            }
            for value in obj.values() {
                collect_history_titles(value, visit);
            }
        }
        _ => {}
    }
}

/// First array found under any of the given keys, at any nesting level;
/// NDJSON bodies are already a top-level array.
fn find_object_array(body: &Value, keys: &[&str]) -> Option<Vec<Value>> {
    match body {
        Value::Array(arr) => Some(arr.clone()),
        Value::Object(obj) => {
            for key in keys {
                if let Some(arr) = obj.get(*key).and_then(Value::as_array) {
                    return Some(arr.clone());
                }
            }
            obj.values().find_map(|v| find_object_array(v, keys))
        }
        _ => None,
    }
}

fn find_array_where(body: &Value, pred: &impl Fn(&Value) -> bool) -> Option<Vec<Value>> {
    match body {
        Value::Array(arr) => {
            if arr.iter().any(pred) {
                return Some(arr.clone());
            }
            arr.iter().find_map(|v| find_array_where(v, pred))
        }
        Value::Object(obj) => obj.values().find_map(|v| find_array_where(v, pred)),
        _ => None,
    }
}

/// Ids arrive as strings or numbers.
fn item_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Times arrive as epoch seconds, epoch millis, or RFC 3339 strings.
fn time_value(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => {
            let t = n.as_f64()?;
            // Heuristic: values past the year 33658 are millis.
            Some(if t > 1e12 { t / 1000.0 } else { t })
        }
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis() as f64 / 1000.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_model::conversation::message_text;
    use serde_json::json;

    const GROK_UUID: &str = "11112222-3333-4444-5555-666677778888";

    fn adapter() -> GrokAdapter {
        GrokAdapter::new()
    }

    fn items_url(rest_id: &str) -> String {
        let vars = urlencoding::encode_binary(
            format!(r#"{{"restId":"{rest_id}"}}"#).as_bytes(),
        )
        .into_owned();
        format!(
            "https://x.com/i/api/graphql/AbCdEf123/GrokConversationItemsByRestId?variables={vars}"
        )
    }

    #[test]
    fn x_items_prefer_rest_id_from_variables() {
        let a = adapter();
        let body = json!({
            "data": {"grok_conversation_items_by_rest_id": {"items": [
                {"chat_item_id": 999, "message": "hello grok", "sender_type": "User",
                 "created_at_ms": 1700000000000u64},
                {"chat_item_id": 999, "message": "hello human", "sender_type": "Agent",
                 "created_at_ms": 1700000005000u64}
            ]}}
        });
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(&body, &items_url("1234567890123456"))
            .unwrap()
        else {
            panic!("expected conversation");
        };
        // restId from variables wins over the reused chat_item_id.
        assert_eq!(conv.conversation_id, "1234567890123456");
        assert_eq!(conv.mapping.values().filter(|n| n.message.is_some()).count(), 2);
        conv.validate().unwrap();

        let readiness = a.evaluate_readiness(&conv);
        assert!(readiness.ready);
    }

    #[test]
    fn x_history_titles_apply_retroactively() {
        let a = adapter();
        let body = json!({
            "data": {"grok_conversation_items_by_rest_id": {"items": [
                {"chat_item_id": 1, "message": "q", "sender_type": "User"},
                {"chat_item_id": 2, "message": "r", "sender_type": "Agent"}
            ]}}
        });
        a.parse_intercepted(&body, &items_url("1111111111111111"))
            .unwrap();

        let history = json!({
            "data": {"grok_history": {"conversations": [
                {"conversation_id": "1111111111111111", "title": "Rust Lifetimes"}
            ]}}
        });
        let url = "https://x.com/i/api/graphql/ZzYy/GrokHistory";
        let ParsedPayload::Titles(updates) = a.parse_intercepted(&history, url).unwrap() else {
            panic!("expected titles");
        };
        assert_eq!(updates[0].title, "Rust Lifetimes");

        // The adapter's own cache learned the title.
        let again = a
            .parse_intercepted(&body, &items_url("1111111111111111"))
            .unwrap();
        let ParsedPayload::Conversation(conv) = again else {
            panic!();
        };
        assert_eq!(conv.title, "Rust Lifetimes");
    }

    #[test]
    fn grokcom_three_endpoint_merge() {
        let a = adapter();

        // 1. load-responses delivers message bodies (as NDJSON).
        let ndjson = format!(
            "{}\n{}\n",
            json!({"responseId": "r1", "message": "why is the sky blue?", "sender": "human",
                   "partial": false, "createTime": 1700000000.0}),
            json!({"responseId": "r2", "message": "Rayleigh scattering.", "sender": "assistant",
                   "partial": false, "model": "grok-4", "createTime": 1700000009.0}),
        );
        let url = format!(
            "https://grok.com/rest/app-chat/conversations/{GROK_UUID}/load-responses"
        );
        let ParsedPayload::Conversation(conv) = a
            .parse_intercepted(&Value::String(ndjson), &url)
            .unwrap()
        else {
            panic!();
        };
        assert_eq!(conv.default_model_slug, "grok-4");
        assert_eq!(conv.mapping.values().filter(|n| n.message.is_some()).count(), 2);

        // 2. response-node reshapes the tree: r2 hangs under r1.
        let nodes = json!({"responseNodes": [
            {"responseId": "r1", "parentResponseId": null},
            {"responseId": "r2", "parentResponseId": "r1"}
        ]});
        let url = format!(
            "https://grok.com/rest/app-chat/conversations/{GROK_UUID}/response-node"
        );
        let ParsedPayload::Conversation(conv) = a.parse_intercepted(&nodes, &url).unwrap() else {
            panic!();
        };
        assert_eq!(conv.mapping["r2"].parent.as_deref(), Some("r1"));
        assert!(!conv.mapping[ROOT_ID].children.contains(&"r2".to_string()));
        conv.validate().unwrap();

        // 3. conversations_v2 brings title and times.
        let meta = json!({"title": "Sky color", "createTime": "2023-11-14T22:13:20Z",
                          "modifyTime": 1700000009.0});
        let url = format!("https://grok.com/rest/app-chat/conversations_v2/{GROK_UUID}");
        let ParsedPayload::Conversation(conv) = a.parse_intercepted(&meta, &url).unwrap() else {
            panic!();
        };
        assert_eq!(conv.title, "Sky color");
        assert_eq!(conv.create_time, Some(1700000000.0));

        let readiness = a.evaluate_readiness(&conv);
        assert!(readiness.ready);
        assert_eq!(
            message_text(conv.latest_assistant().unwrap()),
            "Rayleigh scattering."
        );
    }

    #[test]
    fn partial_responses_are_not_ready() {
        let a = adapter();
        let body = json!({"responses": [
            {"responseId": "r1", "message": "thinking…", "sender": "assistant", "partial": true}
        ]});
        let url = format!(
            "https://grok.com/rest/app-chat/conversations/{GROK_UUID}/load-responses"
        );
        let ParsedPayload::Conversation(conv) = a.parse_intercepted(&body, &url).unwrap() else {
            panic!();
        };
        let readiness = a.evaluate_readiness(&conv);
        assert!(!readiness.ready);
        assert!(!readiness.terminal);
        assert_eq!(
            readiness.reason,
            scribe_core::types::ReadinessReason::AssistantInProgress
        );
    }

    #[test]
    fn page_url_extraction_both_hosts() {
        let a = adapter();
        assert_eq!(
            a.extract_conversation_id(&format!("https://grok.com/c/{GROK_UUID}")),
            Some(GROK_UUID.to_string())
        );
        assert_eq!(
            a.extract_conversation_id("https://x.com/i/grok?conversation=1234567890123456"),
            Some("1234567890123456".to_string())
        );
        assert_eq!(a.extract_conversation_id("https://x.com/i/grok"), None);
    }

    #[test]
    fn unmatched_urls_and_garbage_return_none() {
        let a = adapter();
        assert!(a
            .parse_intercepted(&json!({"x": 1}), "https://grok.com/other")
            .is_none());
        let url = format!(
            "https://grok.com/rest/app-chat/conversations/{GROK_UUID}/load-responses"
        );
        assert!(a
            .parse_intercepted(&Value::String("garbage not json".into()), &url)
            .is_none());
    }

    #[test]
    fn send_endpoints_are_completion_triggers() {
        let a = adapter();
        assert!(a.is_completion_trigger("https://grok.com/rest/app-chat/conversations/new"));
        let responses_url =
            format!("https://grok.com/rest/app-chat/conversations/{GROK_UUID}/responses");
        assert!(a.is_completion_trigger(&responses_url));
        assert_eq!(
            a.extract_conversation_id_from_api_url(&responses_url),
            Some(GROK_UUID.to_string())
        );

        let load_url =
            format!("https://grok.com/rest/app-chat/conversations/{GROK_UUID}/load-responses");
        assert!(!a.is_completion_trigger(&load_url));
        assert!(a.matches_api_endpoint(&load_url));
    }

    #[test]
    fn warm_fetch_urls_only_for_grokcom() {
        let a = adapter();
        assert!(a.build_api_urls("1234567890123456").is_empty());
        let urls = a.build_api_urls(GROK_UUID);
        assert_eq!(urls.len(), 3);
        assert!(urls[0].contains("load-responses"));
    }
}
