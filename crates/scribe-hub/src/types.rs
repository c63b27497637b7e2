use serde::{Deserialize, Serialize};
use serde_json::Value;

use scribe_core::types::{AttemptId, ExportMeta, Provider};
use scribe_model::conversation::Conversation;

/// Stamped on every external event and response envelope.
pub const EXTERNAL_API_VERSION: &str = "scribe-events/1";

/// Subscriber ports must connect under this name.
pub const EXTERNAL_PORT_NAME: &str = "scribe-external-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "conversation.ready")]
    Ready,
    #[serde(rename = "conversation.updated")]
    Updated,
}

/// Event pushed to external subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub api: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub event_id: String,
    pub ts: u64,
    pub provider: Provider,
    pub conversation_id: String,
    pub payload: Conversation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<AttemptId>,
    pub capture_meta: ExportMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}

/// One canonical capture offered to the hub.
#[derive(Debug, Clone)]
pub struct IngestCapture {
    pub conversation_id: String,
    pub provider: Provider,
    pub payload: Conversation,
    pub attempt_id: Option<AttemptId>,
    pub capture_meta: ExportMeta,
    pub content_hash: Option<String>,
    pub tab_id: Option<i64>,
}

/// What the hub caches and persists per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedConversationRecord {
    pub conversation_id: String,
    pub provider: Provider,
    pub payload: Conversation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<AttemptId>,
    pub capture_meta: ExportMeta,
    pub content_hash: Option<String>,
    pub ts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}

/// Shape of the single persisted storage key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistedState {
    pub latest_conversation_id: Option<String>,
    pub records: Vec<CachedConversationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Original,
    Common,
}

/// Pull API requests. Parsed strictly: anything else is INVALID_REQUEST.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalRequest {
    HealthPing,
    GetLatest {
        tab_id: Option<i64>,
        format: ExportFormat,
    },
    GetById {
        conversation_id: String,
        format: ExportFormat,
    },
}

impl ExternalRequest {
    pub fn parse(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let op = obj.get("op").and_then(Value::as_str)?;
        let format = match obj.get("format") {
            None | Some(Value::Null) => ExportFormat::Original,
            Some(Value::String(s)) if s == "original" => ExportFormat::Original,
            Some(Value::String(s)) if s == "common" => ExportFormat::Common,
            _ => return None,
        };
        match op {
            "health.ping" => Some(ExternalRequest::HealthPing),
            "conversation.getLatest" => {
                let tab_id = match obj.get("tab_id") {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(n)) => Some(n.as_i64()?),
                    _ => return None,
                };
                Some(ExternalRequest::GetLatest { tab_id, format })
            }
            "conversation.getById" => {
                let conversation_id = obj
                    .get("conversation_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())?
                    .to_string();
                Some(ExternalRequest::GetById {
                    conversation_id,
                    format,
                })
            }
            _ => None,
        }
    }
}

/// Success/failure envelope, always stamped with the hub's api and clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResponse {
    pub ok: bool,
    pub api: String,
    pub ts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ExternalResponse {
    pub fn ok(ts: u64, payload: Option<Value>) -> Self {
        Self {
            ok: true,
            api: EXTERNAL_API_VERSION.to_string(),
            ts,
            payload,
            error: None,
        }
    }

    pub fn err(ts: u64, code: &str, message: &str) -> Self {
        Self {
            ok: false,
            api: EXTERNAL_API_VERSION.to_string(),
            ts,
            payload: None,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_ops() {
        assert_eq!(
            ExternalRequest::parse(&json!({"op": "health.ping"})),
            Some(ExternalRequest::HealthPing)
        );
        assert_eq!(
            ExternalRequest::parse(&json!({"op": "conversation.getLatest", "tab_id": 7})),
            Some(ExternalRequest::GetLatest {
                tab_id: Some(7),
                format: ExportFormat::Original
            })
        );
        assert_eq!(
            ExternalRequest::parse(
                &json!({"op": "conversation.getById", "conversation_id": "c1", "format": "common"})
            ),
            Some(ExternalRequest::GetById {
                conversation_id: "c1".into(),
                format: ExportFormat::Common
            })
        );
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(ExternalRequest::parse(&json!({"op": "conversation.dropAll"})).is_none());
        assert!(ExternalRequest::parse(&json!({"no_op": true})).is_none());
        assert!(ExternalRequest::parse(&json!("just a string")).is_none());
        assert!(ExternalRequest::parse(&json!({"op": "conversation.getById"})).is_none());
        assert!(ExternalRequest::parse(
            &json!({"op": "conversation.getLatest", "tab_id": "seven"})
        )
        .is_none());
        assert!(ExternalRequest::parse(
            &json!({"op": "conversation.getLatest", "format": "yaml"})
        )
        .is_none());
    }

    #[test]
    fn event_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventKind::Ready).unwrap(),
            r#""conversation.ready""#
        );
        assert_eq!(
            serde_json::to_string(&EventKind::Updated).unwrap(),
            r#""conversation.updated""#
        );
    }
}
