use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use scribe_core::types::{AttemptId, Provider};

// Frame type discriminators — must match the page-context hook scripts.
pub const TYPE_LIFECYCLE: &str = "RESPONSE_LIFECYCLE";
pub const TYPE_STREAM_DELTA: &str = "STREAM_DELTA";
pub const TYPE_DATA_INTERCEPTED: &str = "LLM_CAPTURE_DATA_INTERCEPTED";
pub const TYPE_ATTEMPT_DISPOSED: &str = "ATTEMPT_DISPOSED";
pub const TYPE_STREAM_DUMP_CONFIG: &str = "STREAM_DUMP_CONFIG";

/// Attempt phase as reported over the bridge.
/// Wire values are kebab-case: `prompt-sent`, `streaming`, `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePhase {
    PromptSent,
    Streaming,
    Completed,
}

impl LifecyclePhase {
    /// Monotonic ordering used by the lifecycle machine; a frame whose
    /// priority is ≤ the current phase is discarded.
    pub fn priority(&self) -> u8 {
        match self {
            LifecyclePhase::PromptSent => 1,
            LifecyclePhase::Streaming => 2,
            LifecyclePhase::Completed => 3,
        }
    }
}

/// Page → controller: attempt lifecycle transition.
/// Wire: `{ "type": "RESPONSE_LIFECYCLE", "__sessionToken": "…",
///          "platform": "chatgpt", "attemptId": "…", "phase": "streaming",
///          "conversationId": null }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: String,
    pub platform: Provider,
    pub attempt_id: AttemptId,
    pub phase: LifecyclePhase,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl LifecycleFrame {
    pub fn new(
        token: impl Into<String>,
        platform: Provider,
        attempt_id: AttemptId,
        phase: LifecyclePhase,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            frame_type: TYPE_LIFECYCLE.to_string(),
            session_token: token.into(),
            platform,
            attempt_id,
            phase,
            conversation_id,
        }
    }
}

/// Page → controller: incremental streamed text. Indicative only; deltas
/// never prove readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDeltaFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: String,
    pub platform: Provider,
    /// Which hook produced the delta (e.g. "fetch-sse", "xhr").
    pub source: String,
    pub attempt_id: AttemptId,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub text: String,
}

impl StreamDeltaFrame {
    pub fn new(
        token: impl Into<String>,
        platform: Provider,
        source: impl Into<String>,
        attempt_id: AttemptId,
        conversation_id: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            frame_type: TYPE_STREAM_DELTA.to_string(),
            session_token: token.into(),
            platform,
            source: source.into(),
            attempt_id,
            conversation_id,
            text: text.into(),
        }
    }
}

/// Page → controller: a full intercepted response body (string or object).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInterceptedFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: String,
    pub platform: Provider,
    pub url: String,
    pub data: Value,
    pub attempt_id: AttemptId,
}

impl DataInterceptedFrame {
    pub fn new(
        token: impl Into<String>,
        platform: Provider,
        url: impl Into<String>,
        data: Value,
        attempt_id: AttemptId,
    ) -> Self {
        Self {
            frame_type: TYPE_DATA_INTERCEPTED.to_string(),
            session_token: token.into(),
            platform,
            url: url.into(),
            data,
            attempt_id,
        }
    }
}

/// Page → controller: per-request bookkeeping for the attempt is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDisposedFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: String,
    pub attempt_id: AttemptId,
    pub reason: String,
}

impl AttemptDisposedFrame {
    pub fn new(token: impl Into<String>, attempt_id: AttemptId, reason: impl Into<String>) -> Self {
        Self {
            frame_type: TYPE_ATTEMPT_DISPOSED.to_string(),
            session_token: token.into(),
            attempt_id,
            reason: reason.into(),
        }
    }
}

/// Controller → page: toggle raw stream dumping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDumpConfigFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: String,
    pub enabled: bool,
}

impl StreamDumpConfigFrame {
    pub fn new(token: impl Into<String>, enabled: bool) -> Self {
        Self {
            frame_type: TYPE_STREAM_DUMP_CONFIG.to_string(),
            session_token: token.into(),
            enabled,
        }
    }
}

/// Raw inbound frame — parse the `type` discriminator first, then extract
/// the typed body. Unknown or untyped frames are dropped by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "__sessionToken", default)]
    pub session_token: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    fn to_typed<T: DeserializeOwned>(&self, expected_type: &str) -> Option<T> {
        if self.frame_type != expected_type {
            return None;
        }
        let mut map = self.rest.clone();
        map.insert(
            "type".to_string(),
            Value::String(self.frame_type.clone()),
        );
        map.insert(
            "__sessionToken".to_string(),
            Value::String(self.session_token.clone().unwrap_or_default()),
        );
        serde_json::from_value(Value::Object(map)).ok()
    }

    pub fn as_lifecycle(&self) -> Option<LifecycleFrame> {
        self.to_typed(TYPE_LIFECYCLE)
    }

    pub fn as_stream_delta(&self) -> Option<StreamDeltaFrame> {
        self.to_typed(TYPE_STREAM_DELTA)
    }

    pub fn as_data_intercepted(&self) -> Option<DataInterceptedFrame> {
        self.to_typed(TYPE_DATA_INTERCEPTED)
    }

    pub fn as_attempt_disposed(&self) -> Option<AttemptDisposedFrame> {
        self.to_typed(TYPE_ATTEMPT_DISPOSED)
    }

    pub fn as_stream_dump_config(&self) -> Option<StreamDumpConfigFrame> {
        self.to_typed(TYPE_STREAM_DUMP_CONFIG)
    }

    pub fn as_lease_claim(&self) -> Option<crate::lease::LeaseClaimFrame> {
        self.to_typed(crate::lease::TYPE_PROBE_LEASE_CLAIM)
    }

    pub fn as_lease_release(&self) -> Option<crate::lease::LeaseReleaseFrame> {
        self.to_typed(crate::lease::TYPE_PROBE_LEASE_RELEASE)
    }
}
