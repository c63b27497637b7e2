use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use scribe_core::bounded::BoundedMap;
use scribe_core::config::DEFAULT_ATTEMPT_MAP_CAP;
use scribe_core::types::{AttemptId, Provider};
use scribe_platforms::registry::AdapterRegistry;
use scribe_platforms::sse::{parse_sse_line, SseParsed, SSE_DONE};
use scribe_protocol::frames::{
    AttemptDisposedFrame, DataInterceptedFrame, LifecycleFrame, LifecyclePhase, StreamDeltaFrame,
    StreamDumpConfigFrame,
};

/// A frame as posted from the page context: the payload plus the posting
/// origin the controller will verify.
#[derive(Debug, Clone)]
pub struct PageFrame {
    pub origin: String,
    pub payload: Value,
}

/// Per-request bookkeeping. Dropped as soon as the request finishes.
struct RequestState {
    attempt_id: AttemptId,
    platform: Provider,
    url: String,
    conversation_id: Option<String>,
    /// Carry buffer for SSE lines split across chunk boundaries.
    line_carry: String,
    /// Full response transcript, forwarded on completion.
    transcript: String,
    announced_streaming: bool,
    /// Whether this request created its attempt (a prompt send) as opposed
    /// to reusing the platform's in-flight attempt.
    owns_attempt: bool,
}

/// Page-context interceptor: observes fetch/XHR begin/chunk/end and emits
/// protocol frames. Owns no conversation state; bookkeeping is per-request
/// plus one bounded latest-attempt slot per platform.
pub struct Interceptor {
    registry: AdapterRegistry,
    session_token: String,
    origin: String,
    page_url: String,
    requests: BoundedMap<u64, RequestState>,
    latest_attempt: BoundedMap<Provider, AttemptId>,
    stream_dump_enabled: bool,
    tx: mpsc::UnboundedSender<PageFrame>,
}

impl Interceptor {
    pub fn new(
        registry: AdapterRegistry,
        session_token: impl Into<String>,
        page_url: impl Into<String>,
        tx: mpsc::UnboundedSender<PageFrame>,
    ) -> Self {
        let page_url = page_url.into();
        let origin = url::Url::parse(&page_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default();
        Self {
            registry,
            session_token: session_token.into(),
            origin,
            page_url,
            requests: BoundedMap::new(DEFAULT_ATTEMPT_MAP_CAP),
            latest_attempt: BoundedMap::new(DEFAULT_ATTEMPT_MAP_CAP),
            stream_dump_enabled: false,
            tx,
        }
    }

    /// The page navigated in place (SPA route change).
    pub fn set_page_url(&mut self, page_url: impl Into<String>) {
        self.page_url = page_url.into();
    }

    pub fn on_config(&mut self, frame: &StreamDumpConfigFrame) {
        self.stream_dump_enabled = frame.enabled;
    }

    /// A request left the page. POSTs to a send endpoint mint a fresh
    /// attempt and announce `prompt-sent`; payload GETs piggyback on the
    /// platform's in-flight attempt.
    pub fn on_request_start(&mut self, request_id: u64, method: &str, request_url: &str) {
        let Some(adapter) = self.registry.for_api_url(request_url) else {
            return;
        };
        let platform = adapter.provider();
        let is_send = method.eq_ignore_ascii_case("POST")
            && adapter.is_completion_trigger(request_url);

        let conversation_id = adapter
            .extract_conversation_id_from_api_url(request_url)
            .or_else(|| adapter.extract_conversation_id(&self.page_url));

        let (attempt_id, owns_attempt) = if is_send {
            let minted = AttemptId::mint(platform);
            self.latest_attempt.insert(platform, minted.clone());
            (minted, true)
        } else {
            match self.latest_attempt.get(&platform) {
                Some(existing) => (existing.clone(), false),
                None => {
                    // Cold payload fetch (e.g. navigation to an existing
                    // conversation): it still needs an attempt to ride on.
                    let minted = AttemptId::mint(platform);
                    self.latest_attempt.insert(platform, minted.clone());
                    (minted, true)
                }
            }
        };

        if is_send {
            self.post(
                LifecycleFrame::new(
                    &self.session_token,
                    platform,
                    attempt_id.clone(),
                    LifecyclePhase::PromptSent,
                    conversation_id.clone(),
                ),
            );
        }

        self.requests.insert(
            request_id,
            RequestState {
                attempt_id,
                platform,
                url: request_url.to_string(),
                conversation_id,
                line_carry: String::new(),
                transcript: String::new(),
                announced_streaming: false,
                owns_attempt,
            },
        );
    }

    /// A response chunk arrived. The first chunk of an owned attempt
    /// announces `streaming`; complete SSE data lines become deltas.
    pub fn on_response_chunk(&mut self, request_id: u64, chunk: &str) {
        let Some(state) = self.requests.get_mut(&request_id) else {
            return;
        };
        state.transcript.push_str(chunk);

        let announce = state.owns_attempt && !state.announced_streaming;
        state.announced_streaming = true;

        // Split complete lines; keep the trailing partial line for the next
        // chunk.
        state.line_carry.push_str(chunk);
        let carry = std::mem::take(&mut state.line_carry);
        let mut lines: Vec<&str> = carry.split('\n').collect();
        let remainder = lines.pop().unwrap_or("").to_string();

        let platform = state.platform;
        let attempt_id = state.attempt_id.clone();
        let conversation_id = state.conversation_id.clone();

        let mut deltas: Vec<String> = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data != SSE_DONE {
                    deltas.push(data);
                }
            }
        }

        let raw_dump = self
            .stream_dump_enabled
            .then(|| chunk.to_string());

        if let Some(state) = self.requests.get_mut(&request_id) {
            state.line_carry = remainder;
        }

        if announce {
            self.post(LifecycleFrame::new(
                &self.session_token,
                platform,
                attempt_id.clone(),
                LifecyclePhase::Streaming,
                conversation_id.clone(),
            ));
        }
        for text in deltas {
            self.post(StreamDeltaFrame::new(
                &self.session_token,
                platform,
                "fetch-sse",
                attempt_id.clone(),
                conversation_id.clone(),
                text,
            ));
        }
        if let Some(raw) = raw_dump {
            self.post(StreamDeltaFrame::new(
                &self.session_token,
                platform,
                "raw-dump",
                attempt_id.clone(),
                conversation_id,
                raw,
            ));
        }
    }

    /// The response finished. Owned attempts announce `completed`; bodies
    /// from payload or send endpoints are forwarded whole.
    pub fn on_response_end(&mut self, request_id: u64, status: u16) {
        let Some(state) = self.requests.remove(&request_id) else {
            return;
        };
        if !(200..300).contains(&status) {
            debug!(request_id, status, url = %state.url, "dropping non-2xx response");
            return;
        }

        if state.owns_attempt && state.announced_streaming {
            self.post(LifecycleFrame::new(
                &self.session_token,
                state.platform,
                state.attempt_id.clone(),
                LifecyclePhase::Completed,
                state.conversation_id.clone(),
            ));
        }

        if !state.transcript.is_empty() {
            self.post(DataInterceptedFrame::new(
                &self.session_token,
                state.platform,
                state.url,
                Value::String(state.transcript),
                state.attempt_id,
            ));
        }
    }

    /// The request was aborted or failed; its attempt is gone.
    pub fn on_request_error(&mut self, request_id: u64, reason: &str) {
        let Some(state) = self.requests.remove(&request_id) else {
            return;
        };
        if state.owns_attempt {
            self.post(AttemptDisposedFrame::new(
                &self.session_token,
                state.attempt_id,
                reason,
            ));
        }
    }

    fn post(&self, frame: impl serde::Serialize) {
        let payload = match serde_json::to_value(frame) {
            Ok(v) => v,
            Err(_) => return,
        };
        let _ = self.tx.send(PageFrame {
            origin: self.origin.clone(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_protocol::frames::InboundFrame;

    const PAGE: &str = "https://chatgpt.com/c/0a1b2c3d-1111-2222-3333-444455556666";
    const SEND_URL: &str = "https://chatgpt.com/backend-api/conversation";

    fn setup() -> (Interceptor, mpsc::UnboundedReceiver<PageFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let i = Interceptor::new(AdapterRegistry::with_defaults(), "tok", PAGE, tx);
        (i, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PageFrame>) -> Vec<InboundFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.origin, "https://chatgpt.com");
            out.push(serde_json::from_value(frame.payload).unwrap());
        }
        out
    }

    #[test]
    fn post_to_send_endpoint_emits_prompt_sent() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let lc = frames[0].as_lifecycle().unwrap();
        assert_eq!(lc.phase, LifecyclePhase::PromptSent);
        assert_eq!(
            lc.conversation_id.as_deref(),
            Some("0a1b2c3d-1111-2222-3333-444455556666")
        );
        assert_eq!(lc.session_token, "tok");
    }

    #[test]
    fn sse_chunks_split_across_boundaries() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        let _ = drain(&mut rx);

        // A data line split across two chunks must yield one delta.
        i.on_response_chunk(1, "data: {\"mess");
        i.on_response_chunk(1, "age\":{}}\n\ndata: [DONE]\n\n");

        let frames = drain(&mut rx);
        let deltas: Vec<_> = frames
            .iter()
            .filter_map(|f| f.as_stream_delta())
            .collect();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].text, "{\"message\":{}}");
        assert_eq!(deltas[0].source, "fetch-sse");

        // First chunk also announced streaming.
        let streaming: Vec<_> = frames
            .iter()
            .filter_map(|f| f.as_lifecycle())
            .filter(|l| l.phase == LifecyclePhase::Streaming)
            .collect();
        assert_eq!(streaming.len(), 1);
    }

    #[test]
    fn completion_emits_completed_and_full_body() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        i.on_response_chunk(1, "data: {\"a\":1}\n\n");
        i.on_response_end(1, 200);

        let frames = drain(&mut rx);
        assert!(frames
            .iter()
            .filter_map(|f| f.as_lifecycle())
            .any(|l| l.phase == LifecyclePhase::Completed));
        let data: Vec<_> = frames
            .iter()
            .filter_map(|f| f.as_data_intercepted())
            .collect();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].data.as_str().unwrap(), "data: {\"a\":1}\n\n");
    }

    #[test]
    fn payload_get_rides_existing_attempt() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        let prompt = drain(&mut rx)[0].as_lifecycle().unwrap();

        let get_url =
            "https://chatgpt.com/backend-api/conversation/0a1b2c3d-1111-2222-3333-444455556666";
        i.on_request_start(2, "GET", get_url);
        i.on_response_chunk(2, "{\"conversation_id\":\"x\"}");
        i.on_response_end(2, 200);

        let frames = drain(&mut rx);
        // No second prompt-sent, no streaming/completed for the piggyback.
        assert!(frames.iter().all(|f| f.as_lifecycle().is_none()));
        let data = frames
            .iter()
            .find_map(|f| f.as_data_intercepted())
            .unwrap();
        assert_eq!(data.attempt_id, prompt.attempt_id);
    }

    #[test]
    fn abort_disposes_attempt() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        let _ = drain(&mut rx);
        i.on_request_error(1, "aborted");
        let frames = drain(&mut rx);
        let disposed = frames[0].as_attempt_disposed().unwrap();
        assert_eq!(disposed.reason, "aborted");
    }

    #[test]
    fn non_2xx_bodies_are_dropped() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "POST", SEND_URL);
        i.on_response_chunk(1, "data: {\"a\":1}\n\n");
        let _ = drain(&mut rx);
        i.on_response_end(1, 500);
        let frames = drain(&mut rx);
        assert!(frames.iter().all(|f| f.as_data_intercepted().is_none()));
    }

    #[test]
    fn unrelated_urls_are_ignored() {
        let (mut i, mut rx) = setup();
        i.on_request_start(1, "GET", "https://chatgpt.com/assets/app.js");
        i.on_request_start(2, "POST", "https://telemetry.example.com/beacon");
        i.on_response_end(1, 200);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn gemini_batchexecute_post_is_a_full_turn() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut i = Interceptor::new(
            AdapterRegistry::with_defaults(),
            "tok",
            "https://gemini.google.com/app/abc123",
            tx,
        );
        let url = "https://gemini.google.com/_/BardChatUi/data/batchexecute?rpcids=hNvQHb";
        i.on_request_start(1, "POST", url);
        i.on_response_chunk(1, ")]}'\n\n50\n[[\"wrb.fr\",\"hNvQHb\",\"[]\"]]");
        i.on_response_end(1, 200);

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.origin, "https://gemini.google.com");
            frames.push(serde_json::from_value::<InboundFrame>(frame.payload).unwrap());
        }

        let phases: Vec<_> = frames
            .iter()
            .filter_map(|f| f.as_lifecycle())
            .map(|l| l.phase)
            .collect();
        assert_eq!(
            phases,
            vec![
                LifecyclePhase::PromptSent,
                LifecyclePhase::Streaming,
                LifecyclePhase::Completed
            ]
        );
        // The prompt bound the conversation id from the page URL.
        let prompt = frames[0].as_lifecycle().unwrap();
        assert_eq!(prompt.conversation_id.as_deref(), Some("abc123"));

        let data = frames.iter().find_map(|f| f.as_data_intercepted()).unwrap();
        assert!(data.data.as_str().unwrap().contains("wrb.fr"));
    }

    #[test]
    fn raw_dump_follows_config() {
        let (mut i, mut rx) = setup();
        i.on_config(&StreamDumpConfigFrame::new("tok", true));
        i.on_request_start(1, "POST", SEND_URL);
        i.on_response_chunk(1, "data: {\"a\":1}\n\n");
        let frames = drain(&mut rx);
        assert!(frames
            .iter()
            .filter_map(|f| f.as_stream_delta())
            .any(|d| d.source == "raw-dump"));
    }
}
