use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ModelError, Result};
use scribe_core::hash::sha256_hex;

/// Synthetic id of the root node present in every mapping.
pub const ROOT_ID: &str = "root";

pub const UNKNOWN_MODEL_SLUG: &str = "unknown";

/// Canonical provider-agnostic conversation document.
///
/// A rooted forest of messages: `mapping` always contains a `root` node with
/// `message = None` and `parent = None`; every other node hangs off it.
/// Provider metadata the parser does not understand is preserved verbatim in
/// `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub conversation_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    pub mapping: BTreeMap<String, MessageNode>,
    pub current_node: String,
    #[serde(default = "unknown_slug")]
    pub default_model_slug: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn unknown_slug() -> String {
    UNKNOWN_MODEL_SLUG.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageNode {
    pub id: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub message: Option<Message>,
    /// First-seen order, assigned on insert. Breaks timestamp ties so that
    /// "latest" resolves to the latest-seen message.
    #[serde(skip)]
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub content: Content,
    #[serde(default)]
    pub status: Status,
    /// `None` when the provider did not say — kept unknown, never guessed.
    #[serde(default)]
    pub end_turn: Option<bool>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

impl Role {
    /// Tolerant parse — unknown roles normalize to `assistant`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Thoughts,
    ReasoningRecap,
    Code,
    ExecutionOutput,
}

impl ContentType {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "text" => ContentType::Text,
            "thoughts" => ContentType::Thoughts,
            "reasoning_recap" => ContentType::ReasoningRecap,
            "code" => ContentType::Code,
            "execution_output" => ContentType::ExecutionOutput,
            _ => ContentType::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Content {
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<Vec<Thought>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Content {
    pub fn text(parts: Vec<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            parts: Some(parts),
            thoughts: None,
            content: None,
        }
    }

    /// Tolerant conversion from an untrusted JSON value. Non-object content
    /// normalizes to empty text; string parts keep only the string entries.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Content::text(Vec::new());
        };
        let content_type = obj
            .get("content_type")
            .and_then(Value::as_str)
            .map(ContentType::from_wire)
            .unwrap_or_default();
        let parts = obj.get("parts").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
        let thoughts = obj.get("thoughts").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|t| {
                    let t = t.as_object()?;
                    Some(Thought {
                        summary: t.get("summary").and_then(Value::as_str).map(str::to_string),
                        content: t.get("content").and_then(Value::as_str)?.to_string(),
                    })
                })
                .collect()
        });
        let content = obj.get("content").and_then(Value::as_str).map(str::to_string);
        Self {
            content_type,
            parts,
            thoughts,
            content,
        }
    }
}

/// One section of internal reasoning attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thought {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    FinishedSuccessfully,
    InProgress,
    Error,
}

impl Status {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "finished_successfully" => Status::FinishedSuccessfully,
            "in_progress" => Status::InProgress,
            "error" => Status::Error,
            _ => Status::FinishedSuccessfully,
        }
    }
}

impl Conversation {
    /// An empty conversation: a root-only mapping pointing at itself.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let mut mapping = BTreeMap::new();
        mapping.insert(
            ROOT_ID.to_string(),
            MessageNode {
                id: ROOT_ID.to_string(),
                parent: None,
                children: Vec::new(),
                message: None,
                seq: 0,
            },
        );
        Self {
            conversation_id: conversation_id.into(),
            title: String::new(),
            create_time: None,
            update_time: None,
            mapping,
            current_node: ROOT_ID.to_string(),
            default_model_slug: unknown_slug(),
            extra: serde_json::Map::new(),
        }
    }

    fn next_seq(&self) -> u64 {
        self.mapping.values().map(|n| n.seq).max().unwrap_or(0) + 1
    }

    /// Append a message under `parent_id`, linking both directions.
    /// A missing parent falls back to root rather than failing.
    pub fn add_message(&mut self, parent_id: &str, message: Message) -> String {
        let parent_id = if self.mapping.contains_key(parent_id) {
            parent_id.to_string()
        } else {
            ROOT_ID.to_string()
        };
        let id = message.id.clone();
        let seq = self.next_seq();
        if let Some(parent) = self.mapping.get_mut(&parent_id) {
            if !parent.children.contains(&id) {
                parent.children.push(id.clone());
            }
        }
        self.mapping.insert(
            id.clone(),
            MessageNode {
                id: id.clone(),
                parent: Some(parent_id),
                children: Vec::new(),
                message: Some(message),
                seq,
            },
        );
        id
    }

    /// Move `child_id` under `new_parent_id`, removing it from its previous
    /// parent's children first. Creates placeholder nodes for ids not seen
    /// yet so partial tree updates can arrive in any order.
    pub fn reparent(&mut self, child_id: &str, new_parent_id: &str) {
        self.ensure_node(new_parent_id);
        self.ensure_node(child_id);

        let old_parent = self
            .mapping
            .get(child_id)
            .and_then(|n| n.parent.clone());
        if let Some(old) = old_parent {
            if old != new_parent_id {
                if let Some(node) = self.mapping.get_mut(&old) {
                    node.children.retain(|c| c != child_id);
                }
            }
        }
        if let Some(parent) = self.mapping.get_mut(new_parent_id) {
            if !parent.children.iter().any(|c| c == child_id) {
                parent.children.push(child_id.to_string());
            }
        }
        if let Some(child) = self.mapping.get_mut(child_id) {
            child.parent = Some(new_parent_id.to_string());
        }
    }

    fn ensure_node(&mut self, id: &str) {
        if !self.mapping.contains_key(id) {
            let seq = self.next_seq();
            let under_root = id != ROOT_ID;
            self.mapping.insert(
                id.to_string(),
                MessageNode {
                    id: id.to_string(),
                    parent: under_root.then(|| ROOT_ID.to_string()),
                    children: Vec::new(),
                    message: None,
                    seq,
                },
            );
            if under_root {
                if let Some(root) = self.mapping.get_mut(ROOT_ID) {
                    if !root.children.iter().any(|c| c == id) {
                        root.children.push(id.to_string());
                    }
                }
            }
        }
    }

    /// Iterate message-bearing nodes ordered by (effective time, first-seen).
    pub fn messages_by_time(&self) -> Vec<&MessageNode> {
        let mut nodes: Vec<&MessageNode> =
            self.mapping.values().filter(|n| n.message.is_some()).collect();
        nodes.sort_by(|a, b| {
            let ta = effective_time(a);
            let tb = effective_time(b);
            ta.partial_cmp(&tb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        nodes
    }

    /// The id of the message with the largest `update_time ?? create_time`;
    /// ties resolve to the latest-seen. `None` when only root exists.
    pub fn latest_message_id(&self) -> Option<String> {
        self.messages_by_time().last().map(|n| n.id.clone())
    }

    /// Latest assistant-authored message by effective time.
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages_by_time()
            .into_iter()
            .rev()
            .filter_map(|n| n.message.as_ref())
            .find(|m| m.author.role == Role::Assistant)
    }

    /// Repair `current_node` when the payload value is absent from the
    /// mapping: fall back to the latest message, else root.
    pub fn ensure_current_node(&mut self) {
        if !self.mapping.contains_key(&self.current_node) {
            self.current_node = self
                .latest_message_id()
                .unwrap_or_else(|| ROOT_ID.to_string());
        }
    }

    /// Derive `create_time`/`update_time` from messages when absent.
    pub fn derive_times(&mut self) {
        let times: Vec<f64> = self
            .mapping
            .values()
            .filter_map(|n| n.message.as_ref())
            .flat_map(|m| [m.create_time, m.update_time])
            .flatten()
            .collect();
        if self.create_time.is_none() {
            self.create_time = times.iter().cloned().reduce(f64::min);
        }
        if self.update_time.is_none() {
            self.update_time = times.iter().cloned().reduce(f64::max);
        }
    }

    /// Path of nodes from root to `current_node` (inclusive). Returns an
    /// empty path when the links are broken rather than looping forever.
    pub fn current_path(&self) -> Vec<&MessageNode> {
        let mut path = Vec::new();
        let mut cursor = Some(self.current_node.as_str());
        let mut hops = 0usize;
        while let Some(id) = cursor {
            let Some(node) = self.mapping.get(id) else {
                return Vec::new();
            };
            path.push(node);
            cursor = node.parent.as_deref();
            hops += 1;
            if hops > self.mapping.len() {
                return Vec::new(); // cycle
            }
        }
        path.reverse();
        path
    }

    /// Check the structural invariants of the mapping.
    pub fn validate(&self) -> Result<()> {
        if self.conversation_id.is_empty() {
            return Err(ModelError::EmptyConversationId);
        }
        let root = self.mapping.get(ROOT_ID).ok_or(ModelError::MissingRoot)?;
        if root.parent.is_some() {
            return Err(ModelError::MissingRoot);
        }
        for node in self.mapping.values() {
            match &node.parent {
                None => {
                    if node.id != ROOT_ID {
                        return Err(ModelError::OrphanNode {
                            id: node.id.clone(),
                        });
                    }
                }
                Some(parent_id) => {
                    let parent = self.mapping.get(parent_id).ok_or_else(|| {
                        ModelError::DanglingParent {
                            id: node.id.clone(),
                            parent: parent_id.clone(),
                        }
                    })?;
                    if !parent.children.contains(&node.id) {
                        return Err(ModelError::UnlinkedChild {
                            id: node.id.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                }
            }
            for child in &node.children {
                if !self.mapping.contains_key(child) {
                    return Err(ModelError::DanglingChild {
                        id: node.id.clone(),
                        child: child.clone(),
                    });
                }
            }
        }
        if !self.mapping.contains_key(&self.current_node) {
            return Err(ModelError::BadCurrentNode {
                id: self.current_node.clone(),
            });
        }
        Ok(())
    }

    /// Content hash over the time-ordered message chain. Title is excluded
    /// so a generic→specific title upgrade does not disturb hash stability.
    /// `None` when no assistant message carries non-empty text.
    pub fn content_hash(&self) -> Option<String> {
        let nodes = self.messages_by_time();
        let has_assistant_text = nodes.iter().any(|n| {
            n.message
                .as_ref()
                .map(|m| m.author.role == Role::Assistant && !message_text_raw(m).is_empty())
                .unwrap_or(false)
        });
        if !has_assistant_text {
            return None;
        }
        let mut parts: Vec<String> = Vec::with_capacity(nodes.len() * 3);
        for node in nodes {
            let Some(msg) = node.message.as_ref() else {
                continue;
            };
            parts.push(format!("{:?}", msg.author.role));
            parts.push(format!("{:?}|{:?}", msg.status, msg.end_turn));
            parts.push(message_text(msg));
        }
        Some(sha256_hex(parts.iter().map(String::as_str)))
    }

    /// Stable projection for structural-equivalence comparisons in tests:
    /// the tree modulo seq counters, metadata blobs, and map ordering.
    pub fn canonicalize(&self) -> Value {
        let mut nodes: Vec<Value> = self
            .mapping
            .values()
            .map(|n| {
                serde_json::json!({
                    "id": n.id,
                    "parent": n.parent,
                    "children": n.children,
                    "role": n.message.as_ref().map(|m| format!("{:?}", m.author.role)),
                    "text": n.message.as_ref().map(message_text),
                    "status": n.message.as_ref().map(|m| format!("{:?}", m.status)),
                    "end_turn": n.message.as_ref().and_then(|m| m.end_turn),
                })
            })
            .collect();
        nodes.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
        serde_json::json!({
            "conversation_id": self.conversation_id,
            "title": self.title,
            "current_node": self.current_node,
            "default_model_slug": self.default_model_slug,
            "nodes": nodes,
        })
    }
}

fn effective_time(node: &MessageNode) -> f64 {
    node.message
        .as_ref()
        .and_then(|m| m.update_time.or(m.create_time))
        .unwrap_or(0.0)
}

/// NFC-normalized concatenation of a message's `parts` and `content`,
/// surrounding whitespace kept. ChatGPT's readiness rule counts a
/// whitespace-only message as text.
pub fn message_text_raw(msg: &Message) -> String {
    let mut out = String::new();
    if let Some(parts) = &msg.content.parts {
        for part in parts {
            out.push_str(part);
        }
    }
    if let Some(content) = &msg.content.content {
        out.push_str(content);
    }
    out.nfc().collect()
}

/// NFC-normalized, whitespace-trimmed text. Gemini and Grok readiness
/// requires the trimmed form; hashing and export use it too.
pub fn message_text(msg: &Message) -> String {
    message_text_raw(msg).trim().to_string()
}

/// Tolerant message normalization from an untrusted JSON object.
///
/// Unknown roles become `assistant`, missing content becomes empty text,
/// unknown `end_turn` stays `None`, and metadata is preserved verbatim.
pub fn message_from_value(value: &Value) -> Option<Message> {
    let obj = value.as_object()?;
    let id = obj.get("id").and_then(Value::as_str)?.to_string();
    let author_val = obj.get("author");
    let role = author_val
        .and_then(|a| a.get("role"))
        .and_then(Value::as_str)
        .map(Role::from_wire)
        .unwrap_or_default();
    let author = Author {
        role,
        name: author_val
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        metadata: author_val
            .and_then(|a| a.get("metadata"))
            .cloned()
            .unwrap_or(Value::Null),
    };
    let content = obj
        .get("content")
        .map(Content::from_value)
        .unwrap_or_else(|| Content::text(Vec::new()));
    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .map(Status::from_wire)
        .unwrap_or_default();
    Some(Message {
        id,
        author,
        content,
        status,
        end_turn: obj.get("end_turn").and_then(Value::as_bool),
        create_time: obj.get("create_time").and_then(Value::as_f64),
        update_time: obj.get("update_time").and_then(Value::as_f64),
        metadata: obj.get("metadata").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, role: Role, text: &str, t: f64) -> Message {
        Message {
            id: id.to_string(),
            author: Author {
                role,
                name: None,
                metadata: Value::Null,
            },
            content: Content::text(vec![text.to_string()]),
            status: Status::FinishedSuccessfully,
            end_turn: Some(true),
            create_time: Some(t),
            update_time: Some(t),
            metadata: Value::Null,
        }
    }

    #[test]
    fn new_conversation_has_root_only() {
        let conv = Conversation::new("c1");
        assert!(conv.mapping.contains_key(ROOT_ID));
        assert_eq!(conv.current_node, ROOT_ID);
        conv.validate().unwrap();
    }

    #[test]
    fn add_message_links_both_directions() {
        let mut conv = Conversation::new("c1");
        let u = conv.add_message(ROOT_ID, msg("u1", Role::User, "hi", 1.0));
        conv.add_message(&u, msg("a1", Role::Assistant, "hello", 2.0));
        conv.validate().unwrap();
        assert_eq!(conv.mapping[ROOT_ID].children, vec!["u1"]);
        assert_eq!(conv.mapping["u1"].children, vec!["a1"]);
        assert_eq!(conv.mapping["a1"].parent.as_deref(), Some("u1"));
    }

    #[test]
    fn missing_parent_falls_back_to_root() {
        let mut conv = Conversation::new("c1");
        conv.add_message("nope", msg("a1", Role::Assistant, "x", 1.0));
        conv.validate().unwrap();
        assert_eq!(conv.mapping["a1"].parent.as_deref(), Some(ROOT_ID));
    }

    #[test]
    fn reparent_removes_from_old_parent() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("u1", Role::User, "q", 1.0));
        conv.add_message(ROOT_ID, msg("a1", Role::Assistant, "r", 2.0));
        conv.reparent("a1", "u1");
        conv.validate().unwrap();
        assert!(!conv.mapping[ROOT_ID].children.contains(&"a1".to_string()));
        assert_eq!(conv.mapping["u1"].children, vec!["a1"]);
    }

    #[test]
    fn latest_resolves_ties_to_latest_seen() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("m1", Role::Assistant, "first", 5.0));
        conv.add_message("m1", msg("m2", Role::Assistant, "second", 5.0));
        assert_eq!(conv.latest_message_id().as_deref(), Some("m2"));
    }

    #[test]
    fn ensure_current_node_repairs_bad_pointer() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("m1", Role::User, "hi", 1.0));
        conv.current_node = "ghost".to_string();
        conv.ensure_current_node();
        assert_eq!(conv.current_node, "m1");
    }

    #[test]
    fn derive_times_from_messages() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("m1", Role::User, "a", 10.0));
        conv.add_message("m1", msg("m2", Role::Assistant, "b", 20.0));
        conv.derive_times();
        assert_eq!(conv.create_time, Some(10.0));
        assert_eq!(conv.update_time, Some(20.0));
    }

    #[test]
    fn content_hash_none_without_assistant_text() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("u1", Role::User, "only user", 1.0));
        assert!(conv.content_hash().is_none());
    }

    #[test]
    fn content_hash_ignores_title() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("a1", Role::Assistant, "answer", 1.0));
        let h1 = conv.content_hash();
        conv.title = "Specific Title Now".to_string();
        assert_eq!(h1, conv.content_hash());
    }

    #[test]
    fn content_hash_changes_with_text() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("a1", Role::Assistant, "answer", 1.0));
        let h1 = conv.content_hash();
        let mut conv2 = Conversation::new("c1");
        conv2.add_message(ROOT_ID, msg("a1", Role::Assistant, "answer!", 1.0));
        assert_ne!(h1, conv2.content_hash());
    }

    #[test]
    fn tolerant_message_normalization() {
        let raw = serde_json::json!({
            "id": "m1",
            "author": {"role": "alien-overlord"},
            "content": 42,
            "status": "who-knows",
        });
        let m = message_from_value(&raw).unwrap();
        assert_eq!(m.author.role, Role::Assistant);
        assert_eq!(message_text(&m), "");
        assert_eq!(m.end_turn, None);
        assert_eq!(m.status, Status::FinishedSuccessfully);
    }

    #[test]
    fn message_text_is_nfc_normalized() {
        // "é" as 'e' + combining acute vs precomposed — must compare equal.
        let decomposed = msg("m", Role::Assistant, "cafe\u{0301}", 1.0);
        let composed = msg("m", Role::Assistant, "caf\u{00e9}", 1.0);
        assert_eq!(message_text(&decomposed), message_text(&composed));
    }

    #[test]
    fn validate_rejects_dangling_child() {
        let mut conv = Conversation::new("c1");
        conv.add_message(ROOT_ID, msg("m1", Role::User, "x", 1.0));
        conv.mapping.get_mut("m1").unwrap().children.push("ghost".into());
        assert!(matches!(
            conv.validate(),
            Err(ModelError::DanglingChild { .. })
        ));
    }

    #[test]
    fn validate_rejects_second_parentless_node() {
        let mut conv = Conversation::new("c1");
        conv.mapping.insert(
            "stray".to_string(),
            MessageNode {
                id: "stray".to_string(),
                parent: None,
                children: Vec::new(),
                message: None,
                seq: 9,
            },
        );
        assert!(matches!(conv.validate(), Err(ModelError::OrphanNode { .. })));
    }
}
