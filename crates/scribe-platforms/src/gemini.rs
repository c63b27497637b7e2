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
use scribe_model::conversation::{
    Author, Content, ContentType, Conversation, Message, Role, Status, Thought, ROOT_ID,
};
use scribe_model::title::is_generic_title;

/// batchexecute anti-JSON-hijacking header.
const SECURITY_HEADER: &str = ")]}'";

/// RPC ids inside the batchexecute envelope.
const RPC_CONVERSATION: &str = "hNvQHb";
const RPC_TITLES: &str = "MaZiqc";

/// Gemini adapter: double-encoded batchexecute arrays.
///
/// Conversation turns and titles arrive in separate RPCs; both mutate the
/// adapter's bounded caches, and title changes are additionally published
/// as [`TitleUpdate`] events for downstream caches.
pub struct GeminiAdapter {
    page_re: Regex,
    thought_re: Regex,
    state: Mutex<GeminiState>,
}

struct GeminiState {
    active: BoundedMap<String, Conversation>,
    titles: BoundedMap<String, String>,
    turn_counter: u64,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            page_re: Regex::new(r"^https://gemini\.google\.com/(?:u/\d+/)?app/([0-9a-fA-F]{4,})")
                .expect("static regex"),
            thought_re: Regex::new(r"\n\*\*([^*\n]+)\*\*\n").expect("static regex"),
            state: Mutex::new(GeminiState {
                active: BoundedMap::new(DEFAULT_ACTIVE_CONVERSATION_CAP),
                titles: BoundedMap::new(DEFAULT_TITLE_CACHE_CAP),
                turn_counter: 0,
            }),
        }
    }

    fn parse_envelope(&self, text: &str) -> Option<ParsedPayload> {
        let body = text.strip_prefix(SECURITY_HEADER).unwrap_or(text);
        let start = body.find('[')?;
        let end = body.rfind(']')?;
        if end <= start {
            return None;
        }
        let outer: Value = serde_json::from_str(&body[start..=end]).ok()?;

        let mut rpcs = Vec::new();
        collect_rpc_tuples(&outer, &mut rpcs);

        let mut titles: Vec<TitleUpdate> = Vec::new();
        let mut conversation: Option<Conversation> = None;

        for (rpc_id, payload_str) in rpcs {
            let Ok(payload) = serde_json::from_str::<Value>(&payload_str) else {
                continue;
            };
            match rpc_id.as_str() {
                RPC_CONVERSATION => {
                    if conversation.is_none() {
                        conversation = self.ingest_conversation(&payload);
                    }
                }
                RPC_TITLES => titles.extend(self.ingest_titles(&payload)),
                _ => {}
            }
        }

        if let Some(conv) = conversation {
            return Some(ParsedPayload::Conversation(conv));
        }
        if !titles.is_empty() {
            return Some(ParsedPayload::Titles(titles));
        }
        None
    }

    /// Conversation RPC: `payload[0][0][0]` is the turn tuple. Index 0
    /// carries `[id, responseId, …]` (or the bare id), index 2 the user
    /// slot, index 3 the assistant slot.
    fn ingest_conversation(&self, payload: &Value) -> Option<Conversation> {
        let tuple = payload.get(0)?.get(0)?.get(0)?;

        let (raw_id, response_id) = match tuple.get(0) {
            Some(Value::String(id)) => (
                id.clone(),
                tuple.get(1).and_then(Value::as_str).map(str::to_string),
            ),
            Some(Value::Array(head)) => (
                head.first().and_then(Value::as_str)?.to_string(),
                head.get(1).and_then(Value::as_str).map(str::to_string),
            ),
            _ => return None,
        };
        let conversation_id = raw_id.strip_prefix("c_").unwrap_or(&raw_id).to_string();
        if conversation_id.is_empty() {
            return None;
        }

        let user_slot = tuple.get(2).map(decode_slot);
        let assistant_slot = tuple.get(3).map(decode_slot);

        let user_text = user_slot.as_ref().and_then(slot_text);
        let assistant_text = assistant_slot.as_ref().and_then(slot_text);
        let reasoning = assistant_slot.as_ref().and_then(slot_reasoning);
        let model_slug = assistant_slot
            .as_ref()
            .and_then(|s| s.get(21))
            .and_then(Value::as_str)
            .map(gemini_model_slug);

        if user_text.is_none() && assistant_text.is_none() {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        state.turn_counter += 1;
        let turn = state.turn_counter;
        let turn_key = response_id.unwrap_or_else(|| format!("t{turn}"));

        let mut conv = state
            .active
            .get(&conversation_id)
            .cloned()
            .unwrap_or_else(|| Conversation::new(conversation_id.clone()));

        let mut tail = conv
            .latest_message_id()
            .unwrap_or_else(|| ROOT_ID.to_string());
        if let Some(text) = user_text {
            tail = upsert_message(
                &mut conv,
                &tail,
                format!("{turn_key}-user"),
                Role::User,
                Content::text(vec![text]),
                None,
            );
        }
        if let Some(text) = assistant_text {
            let thoughts = reasoning.map(|r| self.split_thoughts(&r));
            let content = Content {
                content_type: ContentType::Text,
                parts: Some(vec![text]),
                thoughts: thoughts.filter(|t| !t.is_empty()),
                content: None,
            };
            tail = upsert_message(
                &mut conv,
                &tail,
                format!("{turn_key}-model"),
                Role::Assistant,
                content,
                Some(true),
            );
        }
        conv.current_node = tail;
        conv.ensure_current_node();

        if let Some(slug) = model_slug {
            conv.default_model_slug = slug;
        }
        if is_generic_title(&conv.title) {
            if let Some(title) = state.titles.get(&conversation_id) {
                conv.title = title.clone();
            }
        }

        state.active.insert(conversation_id, conv.clone());
        Some(conv)
    }

    /// Titles RPC: `payload[2]` is a list of `["c_<id>", title, …]`.
    fn ingest_titles(&self, payload: &Value) -> Vec<TitleUpdate> {
        let Some(list) = payload.get(2).and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut updates = Vec::new();
        let mut state = self.state.lock().unwrap();
        for entry in list {
            let Some(raw_id) = entry.get(0).and_then(Value::as_str) else {
                continue;
            };
            let Some(title) = entry.get(1).and_then(Value::as_str) else {
                continue;
            };
            let id = raw_id.strip_prefix("c_").unwrap_or(raw_id).to_string();
            if id.is_empty() || title.is_empty() {
                continue;
            }
            state.titles.insert(id.clone(), title.to_string());
            if let Some(conv) = state.active.get_mut(&id) {
                conv.title = title.to_string();
            }
            updates.push(TitleUpdate {
                conversation_id: id,
                title: title.to_string(),
            });
        }
        updates
    }

    /// Split a reasoning blob into sections delimited by `\n**<title>**\n`.
    fn split_thoughts(&self, text: &str) -> Vec<Thought> {
        let mut thoughts = Vec::new();
        let mut last_end = 0usize;
        let mut pending_title: Option<String> = None;

        for caps in self.thought_re.captures_iter(text) {
            let m = caps.get(0).expect("whole match");
            let chunk = text[last_end..m.start()].trim();
            if !chunk.is_empty() {
                thoughts.push(Thought {
                    summary: pending_title.take(),
                    content: chunk.to_string(),
                });
            }
            pending_title = Some(caps[1].trim().to_string());
            last_end = m.end();
        }
        let tail = text[last_end..].trim();
        if !tail.is_empty() {
            thoughts.push(Thought {
                summary: pending_title,
                content: tail.to_string(),
            });
        }
        thoughts
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn display_name(&self) -> &str {
        "Gemini"
    }

    fn is_platform_url(&self, url: &str) -> bool {
        url.starts_with("https://gemini.google.com/")
    }

    fn extract_conversation_id(&self, page_url: &str) -> Option<String> {
        self.page_re.captures(page_url).map(|c| c[1].to_string())
    }

    fn matches_api_endpoint(&self, url: &str) -> bool {
        url.starts_with("https://gemini.google.com/") && url.contains("batchexecute")
    }

    /// Each turn is one batchexecute POST whose response carries the full
    /// turn, so the payload endpoint doubles as the send endpoint.
    fn is_completion_trigger(&self, url: &str) -> bool {
        self.matches_api_endpoint(url)
    }

    fn parse_intercepted(&self, data: &Value, url: &str) -> Option<ParsedPayload> {
        let text = data.as_str()?;
        let parsed = self.parse_envelope(text);
        if parsed.is_none() {
            debug!(%url, "unrecognized gemini payload");
        }
        parsed
    }

    fn evaluate_readiness(&self, conv: &Conversation) -> PlatformReadiness {
        latest_assistant_readiness(conv)
    }

    fn is_conversation_payload(&self, payload: &Value) -> bool {
        payload
            .as_str()
            .map(|t| t.contains("wrb.fr") && t.contains(RPC_CONVERSATION))
            .unwrap_or(false)
    }

    fn format_filename(&self, conv: &Conversation) -> String {
        let slug = filename_slug(&conv.title, 48);
        let short_id: String = conv.conversation_id.chars().take(8).collect();
        if slug.is_empty() {
            format!("gemini-{short_id}.json")
        } else {
            format!("gemini-{slug}-{short_id}.json")
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

/// Depth-first scan for `["wrb.fr", rpcId, payloadJsonString, …]` tuples.
fn collect_rpc_tuples(value: &Value, out: &mut Vec<(String, String)>) {
    let Some(arr) = value.as_array() else {
        return;
    };
    let is_tuple = arr.first().and_then(Value::as_str) == Some("wrb.fr");
    if is_tuple {
        if let (Some(rpc), Some(payload)) = (
            arr.get(1).and_then(Value::as_str),
            arr.get(2).and_then(Value::as_str),
        ) {
            out.push((rpc.to_string(), payload.to_string()));
        }
        return;
    }
    for item in arr {
        collect_rpc_tuples(item, out);
    }
}

/// Slots may be plain arrays or a further JSON-stringified layer.
fn decode_slot(slot: &Value) -> Value {
    match slot {
        Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Turn text lives at `slot[0][0][1][0]`; minimal segment payloads carry it
/// at `slot[0][0]` directly.
fn slot_text(slot: &Value) -> Option<String> {
    if let Some(text) = slot
        .get(0)
        .and_then(|v| v.get(0))
        .and_then(|v| v.get(1))
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    slot.get(0)
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Reasoning text lives at `slot[0][0][37][0][0]`.
fn slot_reasoning(slot: &Value) -> Option<String> {
    slot.get(0)?
        .get(0)?
        .get(37)?
        .get(0)?
        .get(0)?
        .as_str()
        .map(str::to_string)
}

fn upsert_message(
    conv: &mut Conversation,
    parent: &str,
    id: String,
    role: Role,
    content: Content,
    end_turn: Option<bool>,
) -> String {
    let message = Message {
        id: id.clone(),
        author: Author {
            role,
            name: None,
            metadata: Value::Null,
        },
        content,
        status: Status::FinishedSuccessfully,
        end_turn,
        create_time: None,
        update_time: None,
        metadata: Value::Null,
    };
    if conv.mapping.contains_key(&id) {
        if let Some(node) = conv.mapping.get_mut(&id) {
            node.message = Some(message);
        }
        id
    } else {
        conv.add_message(parent, message)
    }
}

/// `"Gemini 2.5 Pro"` → `gemini-2.5-pro`; already-prefixed names are not
/// doubled.
fn gemini_model_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.starts_with("gemini") {
        slug
    } else {
        format!("gemini-{slug}")
    }
}
