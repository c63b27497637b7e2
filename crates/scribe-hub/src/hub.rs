use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::SnapshotStore;
use crate::types::{
    CachedConversationRecord, ConversationEvent, EventKind, ExportFormat, ExternalRequest,
    ExternalResponse, IngestCapture, PersistedState, EXTERNAL_PORT_NAME,
};
use scribe_core::bounded::BoundedMap;
use scribe_core::config::HubConfig;
use scribe_core::error::ScribeError;
use scribe_core::types::Provider;
use scribe_model::export::CommonExport;
use scribe_model::title::is_generic_title;

/// A connected external subscriber.
///
/// Ports whose `post` fails are pruned on the next broadcast; ports that
/// connect under the wrong name are disconnected immediately.
pub trait SubscriberPort: Send {
    fn name(&self) -> &str;
    fn post(&self, event: &ConversationEvent) -> Result<(), ScribeError>;
    fn disconnect(&self);
}

/// Per-conversation dispatch dedup state.
#[derive(Debug, Clone, Default)]
struct DispatchState {
    has_ready: bool,
    last_content_hash: Option<String>,
    last_title_generic: bool,
    /// Attempts that already consumed their one title-upgrade event.
    upgraded_attempts: Vec<String>,
}

/// Owner-process external event hub: dedup, broadcast, debounced
/// quota-aware persistence, and the pull API.
///
/// Single-owner: the owner process's loop serializes all calls, so there is
/// no interior locking. Persistence is therefore trivially single-flight.
pub struct EventHub {
    store: Box<dyn SnapshotStore>,
    config: HubConfig,
    records: BoundedMap<String, CachedConversationRecord>,
    dispatch: BoundedMap<String, DispatchState>,
    latest_conversation_id: Option<String>,
    ports: Vec<Box<dyn SubscriberPort>>,
    hydrated: bool,
    dirty_since_ms: Option<u64>,
}

impl EventHub {
    pub fn new(store: Box<dyn SnapshotStore>, config: HubConfig) -> Self {
        let record_cap = config.record_cap;
        let dispatch_cap = config.dispatch_state_cap;
        Self {
            store,
            config,
            records: BoundedMap::new(record_cap),
            dispatch: BoundedMap::new(dispatch_cap),
            latest_conversation_id: None,
            ports: Vec::new(),
            hydrated: false,
            dirty_since_ms: None,
        }
    }

    /// One-shot hydration from the storage key. Malformed records are
    /// discarded by strict validation; the persisted latest pointer is only
    /// honored when its record survived.
    pub fn ensure_hydrated(&mut self) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;

        let raw = match self.store.load() {
            Ok(Some(v)) => v,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "hub hydration load failed");
                return;
            }
        };

        let persisted_latest = raw
            .get("latest_conversation_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let raw_records = raw
            .get("records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut kept = 0usize;
        for raw_record in &raw_records {
            let Some(record) = validate_record(raw_record) else {
                debug!("discarding malformed persisted record");
                continue;
            };
            self.records
                .insert(record.conversation_id.clone(), record);
            kept += 1;
        }

        self.latest_conversation_id = persisted_latest
            .filter(|id| self.records.contains_key(id))
            .or_else(|| {
                self.records
                    .iter()
                    .max_by_key(|(_, r)| r.ts)
                    .map(|(id, _)| id.clone())
            });
        info!(kept, discarded = raw_records.len() - kept, "hub hydrated");
    }

    /// Accept a subscriber. Wrong-name ports are disconnected on the spot.
    pub fn connect(&mut self, port: Box<dyn SubscriberPort>) -> bool {
        if port.name() != EXTERNAL_PORT_NAME {
            debug!(name = %port.name(), "disconnecting wrong-name subscriber port");
            port.disconnect();
            return false;
        }
        self.ports.push(port);
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.ports.len()
    }

    /// Ingest a canonical-ready capture: dedup, cache, broadcast, and
    /// schedule persistence. Returns the event if one was emitted.
    pub fn ingest(&mut self, capture: IngestCapture, now_ms: u64) -> Option<ConversationEvent> {
        self.ensure_hydrated();

        // Degraded captures never reach external subscribers.
        if !capture.capture_meta.is_canonical_high() {
            debug!(conversation = %capture.conversation_id,
                   "refusing non-canonical capture at the hub");
            return None;
        }

        let conv_id = capture.conversation_id.clone();
        let title_generic = is_generic_title(&capture.payload.title);
        let attempt_key = capture
            .attempt_id
            .as_ref()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();

        let mut state = self.dispatch.remove(&conv_id).unwrap_or_default();

        let kind = if !state.has_ready {
            state.has_ready = true;
            Some(EventKind::Ready)
        } else if state.last_content_hash != capture.content_hash {
            Some(EventKind::Updated)
        } else if state.last_title_generic
            && !title_generic
            && !state.upgraded_attempts.contains(&attempt_key)
        {
            // Generic → specific title, at most once per (conversation,
            // attempt).
            state.upgraded_attempts.push(attempt_key);
            Some(EventKind::Updated)
        } else {
            None
        };
        state.last_content_hash = capture.content_hash.clone();
        state.last_title_generic = title_generic;
        self.dispatch.insert(conv_id.clone(), state);

        // The record cache updates even when the event is suppressed, so
        // the pull API always serves the freshest capture.
        self.records.insert(
            conv_id.clone(),
            CachedConversationRecord {
                conversation_id: conv_id.clone(),
                provider: capture.provider,
                payload: capture.payload.clone(),
                attempt_id: capture.attempt_id.clone(),
                capture_meta: capture.capture_meta,
                content_hash: capture.content_hash.clone(),
                ts: now_ms,
                tab_id: capture.tab_id,
            },
        );
        self.latest_conversation_id = Some(conv_id.clone());
        self.dirty_since_ms.get_or_insert(now_ms);

        let kind = kind?;
        let event = ConversationEvent {
            api: crate::types::EXTERNAL_API_VERSION.to_string(),
            kind,
            event_id: Uuid::new_v4().to_string(),
            ts: now_ms,
            provider: capture.provider,
            conversation_id: conv_id,
            payload: capture.payload,
            attempt_id: capture.attempt_id,
            capture_meta: capture.capture_meta,
            content_hash: capture.content_hash,
            tab_id: capture.tab_id,
        };
        self.broadcast(&event);
        Some(event)
    }

    /// Broadcast in ingest order; ports that fail to post are pruned.
    fn broadcast(&mut self, event: &ConversationEvent) {
        let before = self.ports.len();
        self.ports.retain(|port| port.post(event).is_ok());
        let pruned = before - self.ports.len();
        if pruned > 0 {
            debug!(pruned, "pruned dead subscriber ports");
        }
    }

    /// Debounced persistence: flush only once the coalescing window has
    /// passed since the first unflushed mutation.
    pub fn maybe_flush(&mut self, now_ms: u64) -> bool {
        match self.dirty_since_ms {
            Some(since) if now_ms.saturating_sub(since) >= self.config.persist_debounce_ms => {
                self.flush_persist();
                true
            }
            _ => false,
        }
    }

    /// Persist the snapshot now, shedding oldest records on quota errors.
    /// Returns the number of write attempts (for observability).
    pub fn flush_persist(&mut self) -> u64 {
        self.ensure_hydrated();
        let mut records: Vec<CachedConversationRecord> =
            self.records.iter().map(|(_, r)| r.clone()).collect();
        let mut latest = self
            .latest_conversation_id
            .clone()
            .filter(|id| records.iter().any(|r| &r.conversation_id == id));

        let max_attempts = records.len() as u64 + 1;
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            let snapshot = match serde_json::to_value(PersistedState {
                latest_conversation_id: latest.clone(),
                records: records.clone(),
            }) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "hub snapshot serialization failed");
                    return attempts;
                }
            };
            match self.store.save(&snapshot) {
                Ok(()) => {
                    self.dirty_since_ms = None;
                    return attempts;
                }
                Err(e) if e.is_quota() && !records.is_empty() && attempts < max_attempts => {
                    // Shed the oldest record everywhere and retry with the
                    // recomputed latest pointer.
                    let dropped = records.remove(0);
                    warn!(conversation = %dropped.conversation_id, attempts,
                          "quota exceeded, shedding oldest record");
                    self.records.remove(&dropped.conversation_id);
                    latest = records.last().map(|r| r.conversation_id.clone());
                    self.latest_conversation_id = latest.clone();
                }
                Err(e) if e.is_quota() => {
                    warn!(error = %e, "quota persists even for the minimal snapshot");
                    return attempts;
                }
                Err(e) => {
                    // Non-quota failures terminate without touching the
                    // in-memory cache.
                    warn!(error = %e, "hub persistence failed");
                    return attempts;
                }
            }
        }
    }

    /// Pull API entry point.
    pub fn handle_external_request(&mut self, raw: &Value, now_ms: u64) -> ExternalResponse {
        self.ensure_hydrated();
        let Some(request) = ExternalRequest::parse(raw) else {
            return ExternalResponse::err(now_ms, "INVALID_REQUEST", "unrecognized request");
        };

        match request {
            ExternalRequest::HealthPing => ExternalResponse::ok(now_ms, None),

            ExternalRequest::GetLatest { tab_id, format } => match tab_id {
                Some(tab) => {
                    let newest = self
                        .records
                        .iter()
                        .filter(|(_, r)| r.tab_id == Some(tab))
                        .max_by_key(|(_, r)| r.ts)
                        .map(|(_, r)| r.clone());
                    match newest {
                        Some(record) => {
                            ExternalResponse::ok(now_ms, Some(render_record(&record, format)))
                        }
                        // A tab-scoped miss is UNAVAILABLE, not NOT_FOUND.
                        None => ExternalResponse::err(
                            now_ms,
                            "UNAVAILABLE",
                            "no capture for that tab",
                        ),
                    }
                }
                None => {
                    let record = self
                        .latest_conversation_id
                        .clone()
                        .and_then(|id| self.records.get(&id).cloned());
                    match record {
                        Some(record) => {
                            ExternalResponse::ok(now_ms, Some(render_record(&record, format)))
                        }
                        None => {
                            ExternalResponse::err(now_ms, "NOT_FOUND", "no captures yet")
                        }
                    }
                }
            },

            ExternalRequest::GetById {
                conversation_id,
                format,
            } => match self.records.get(&conversation_id).cloned() {
                Some(record) => {
                    ExternalResponse::ok(now_ms, Some(render_record(&record, format)))
                }
                None => ExternalResponse::err(now_ms, "NOT_FOUND", "unknown conversation"),
            },
        }
    }

    pub fn record(&self, conversation_id: &str) -> Option<&CachedConversationRecord> {
        self.records.get(&conversation_id.to_string())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn render_record(record: &CachedConversationRecord, format: ExportFormat) -> Value {
    match format {
        ExportFormat::Original => serde_json::to_value(record).unwrap_or(Value::Null),
        ExportFormat::Common => {
            let export =
                CommonExport::from_conversation(&record.payload, display_name(record.provider));
            serde_json::to_value(export).unwrap_or(Value::Null)
        }
    }
}

fn display_name(provider: Provider) -> &'static str {
    match provider {
        Provider::Chatgpt => "ChatGPT",
        Provider::Gemini => "Gemini",
        Provider::Grok => "Grok",
        Provider::Unknown => "unknown",
    }
}

/// Strict persisted-record validation: shape, non-empty id, and a payload
/// that still satisfies the conversation invariants.
fn validate_record(raw: &Value) -> Option<CachedConversationRecord> {
    let record: CachedConversationRecord = serde_json::from_value(raw.clone()).ok()?;
    if record.conversation_id.is_empty() {
        return None;
    }
    if record.payload.validate().is_err() {
        return None;
    }
    Some(record)
}
