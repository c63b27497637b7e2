// Verify the bridge wire format matches what the page-context hook scripts
// emit. These tests pin serialized field names and discriminators.

use scribe_core::types::{AttemptId, Provider};
use scribe_protocol::frames::{
    InboundFrame, LifecycleFrame, LifecyclePhase, StreamDumpConfigFrame,
};
use scribe_protocol::lease::{LeaseClaimFrame, LeaseClaimResultFrame};

#[test]
fn lifecycle_frame_round_trip() {
    let json = r#"{
        "type": "RESPONSE_LIFECYCLE",
        "__sessionToken": "tok-1",
        "platform": "chatgpt",
        "attemptId": "chatgpt:0b7e",
        "phase": "prompt-sent",
        "conversationId": null
    }"#;
    let frame = InboundFrame::parse(json).unwrap();
    assert_eq!(frame.frame_type, "RESPONSE_LIFECYCLE");

    let lifecycle = frame.as_lifecycle().unwrap();
    assert_eq!(lifecycle.platform, Provider::Chatgpt);
    assert_eq!(lifecycle.phase, LifecyclePhase::PromptSent);
    assert_eq!(lifecycle.attempt_id.as_str(), "chatgpt:0b7e");
    assert!(lifecycle.conversation_id.is_none());
}

#[test]
fn lifecycle_serializes_kebab_phase_and_token_key() {
    let frame = LifecycleFrame::new(
        "tok",
        Provider::Gemini,
        AttemptId::from("gemini:1"),
        LifecyclePhase::Streaming,
        Some("conv-9".to_string()),
    );
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""type":"RESPONSE_LIFECYCLE""#));
    assert!(json.contains(r#""__sessionToken":"tok""#));
    assert!(json.contains(r#""phase":"streaming""#));
    assert!(json.contains(r#""attemptId":"gemini:1""#));
    assert!(json.contains(r#""conversationId":"conv-9""#));
}

#[test]
fn stream_delta_requires_attempt_id() {
    // Legacy attempt-less frames must fail to parse into the typed shape.
    let json = r#"{
        "type": "STREAM_DELTA",
        "__sessionToken": "tok",
        "platform": "grok",
        "source": "fetch-sse",
        "text": "partial"
    }"#;
    let frame = InboundFrame::parse(json).unwrap();
    assert!(frame.as_stream_delta().is_none());
}

#[test]
fn data_intercepted_accepts_string_or_object_data() {
    let as_string = r#"{
        "type": "LLM_CAPTURE_DATA_INTERCEPTED",
        "__sessionToken": "tok",
        "platform": "chatgpt",
        "url": "https://chatgpt.com/backend-api/conversation/x",
        "data": "data: [DONE]",
        "attemptId": "chatgpt:2"
    }"#;
    let frame = InboundFrame::parse(as_string).unwrap();
    let typed = frame.as_data_intercepted().unwrap();
    assert!(typed.data.is_string());

    let as_object = r#"{
        "type": "LLM_CAPTURE_DATA_INTERCEPTED",
        "__sessionToken": "tok",
        "platform": "chatgpt",
        "url": "https://chatgpt.com/backend-api/conversation/x",
        "data": {"conversation_id": "x"},
        "attemptId": "chatgpt:2"
    }"#;
    let frame = InboundFrame::parse(as_object).unwrap();
    let typed = frame.as_data_intercepted().unwrap();
    assert!(typed.data.is_object());
}

#[test]
fn wrong_type_does_not_parse_as_other_frame() {
    let json = r#"{"type":"STREAM_DUMP_CONFIG","__sessionToken":"t","enabled":true}"#;
    let frame = InboundFrame::parse(json).unwrap();
    assert!(frame.as_lifecycle().is_none());
    assert!(frame.as_stream_delta().is_none());
    assert!(frame.as_stream_dump_config().unwrap().enabled);
}

#[test]
fn unknown_frame_parses_but_yields_no_typed_body() {
    let frame = InboundFrame::parse(r#"{"type":"SOMETHING_ELSE","x":1}"#).unwrap();
    assert!(frame.as_lifecycle().is_none());
    assert!(frame.as_data_intercepted().is_none());
}

#[test]
fn untyped_message_is_rejected() {
    assert!(InboundFrame::parse(r#"{"x":1}"#).is_none());
    assert!(InboundFrame::parse("not json").is_none());
}

#[test]
fn stream_dump_config_wire_shape() {
    let frame = StreamDumpConfigFrame::new("tok", false);
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""type":"STREAM_DUMP_CONFIG""#));
    assert!(json.contains(r#""enabled":false"#));
}

#[test]
fn lease_claim_round_trip() {
    let claim = LeaseClaimFrame::new("c1", AttemptId::from("a1"), 5000);
    let json = serde_json::to_string(&claim).unwrap();
    assert!(json.contains(r#""type":"PROBE_LEASE_CLAIM""#));
    assert!(json.contains(r#""conversationId":"c1""#));
    assert!(json.contains(r#""ttlMs":5000"#));

    let frame = InboundFrame::parse(&json).unwrap();
    let parsed = frame.as_lease_claim().unwrap();
    assert_eq!(parsed.conversation_id, "c1");
    assert_eq!(parsed.ttl_ms, 5000);
}

#[test]
fn lease_result_carries_owner() {
    let result = LeaseClaimResultFrame::new(false, AttemptId::from("a1"), 123_456);
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains(r#""acquired":false"#));
    assert!(json.contains(r#""ownerAttemptId":"a1""#));
    assert!(json.contains(r#""expiresAtMs":123456"#));
}
