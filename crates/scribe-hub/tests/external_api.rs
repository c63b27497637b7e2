// Pins the serialized shapes external subscribers and pull-API clients
// depend on. Field renames here are breaking changes for integrators.

use serde_json::{json, Value};

use scribe_core::types::{AttemptId, ExportMeta, Provider};
use scribe_hub::hub::EventHub;
use scribe_hub::store::MemoryStore;
use scribe_hub::types::{
    ConversationEvent, EventKind, ExternalResponse, IngestCapture, EXTERNAL_API_VERSION,
};
use scribe_model::conversation::{Author, Content, Conversation, Message, Role, Status, ROOT_ID};

fn conversation(id: &str) -> Conversation {
    let mut conv = Conversation::new(id);
    conv.title = "Wire Shapes".to_string();
    conv.add_message(
        ROOT_ID,
        Message {
            id: "a1".into(),
            author: Author {
                role: Role::Assistant,
                name: None,
                metadata: Value::Null,
            },
            content: Content::text(vec!["body".into()]),
            status: Status::FinishedSuccessfully,
            end_turn: Some(true),
            create_time: Some(1.0),
            update_time: Some(1.0),
            metadata: Value::Null,
        },
    );
    conv.current_node = "a1".to_string();
    conv
}

#[test]
fn conversation_event_wire_shape() {
    let mut hub = EventHub::new(Box::new(MemoryStore::new()), Default::default());
    let event = hub
        .ingest(
            IngestCapture {
                conversation_id: "c1".into(),
                provider: Provider::Gemini,
                payload: conversation("c1"),
                attempt_id: Some(AttemptId::from("gemini:a1")),
                capture_meta: ExportMeta::canonical(),
                content_hash: Some("h1".into()),
                tab_id: Some(3),
            },
            1234,
        )
        .expect("first ingest fires");

    let wire = serde_json::to_value(&event).unwrap();
    assert_eq!(wire["api"], json!(EXTERNAL_API_VERSION));
    assert_eq!(wire["type"], json!("conversation.ready"));
    assert_eq!(wire["ts"], json!(1234));
    assert_eq!(wire["provider"], json!("gemini"));
    assert_eq!(wire["conversation_id"], json!("c1"));
    assert_eq!(wire["attempt_id"], json!("gemini:a1"));
    assert_eq!(wire["content_hash"], json!("h1"));
    assert_eq!(wire["tab_id"], json!(3));
    assert_eq!(wire["capture_meta"]["captureSource"], json!("canonical_api"));
    assert!(wire["event_id"].as_str().map_or(false, |s| !s.is_empty()));
    assert!(wire["payload"]["mapping"].is_object());

    // Round trip for subscribers that re-parse.
    let parsed: ConversationEvent = serde_json::from_value(wire).unwrap();
    assert_eq!(parsed.kind, EventKind::Ready);
    assert_eq!(parsed.conversation_id, "c1");
}

#[test]
fn response_envelope_wire_shape() {
    let ok = ExternalResponse::ok(7, Some(json!({"x": 1})));
    let wire = serde_json::to_value(&ok).unwrap();
    assert_eq!(wire["ok"], json!(true));
    assert_eq!(wire["api"], json!(EXTERNAL_API_VERSION));
    assert_eq!(wire["ts"], json!(7));
    assert_eq!(wire["payload"]["x"], json!(1));
    assert!(wire.get("error").is_none());

    let err = ExternalResponse::err(9, "NOT_FOUND", "missing");
    let wire = serde_json::to_value(&err).unwrap();
    assert_eq!(wire["ok"], json!(false));
    assert_eq!(wire["error"]["code"], json!("NOT_FOUND"));
    assert!(wire.get("payload").is_none());
}

#[test]
fn pull_api_serves_the_cached_record_shape() {
    let snapshot = {
        let mut hub = EventHub::new(Box::new(MemoryStore::new()), Default::default());
        hub.ingest(
            IngestCapture {
                conversation_id: "c1".into(),
                provider: Provider::Grok,
                payload: conversation("c1"),
                attempt_id: None,
                capture_meta: ExportMeta::canonical(),
                content_hash: Some("h".into()),
                tab_id: None,
            },
            10,
        );
        hub.flush_persist();
        hub.handle_external_request(&json!({"op": "conversation.getById", "conversation_id": "c1"}), 0)
            .payload
            .unwrap()
    };
    assert_eq!(snapshot["provider"], json!("grok"));
    assert_eq!(snapshot["payload"]["title"], json!("Wire Shapes"));
}
