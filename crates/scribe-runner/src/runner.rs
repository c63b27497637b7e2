use serde_json::Value;
use tracing::{debug, info, warn};

use crate::recovery::{SnapshotSource, WarmFetcher};
use crate::types::{ExportState, ReadyCapture, RunnerEvent};
use scribe_core::bounded::BoundedMap;
use scribe_core::config::{ScribeConfig, DEFAULT_ATTEMPT_MAP_CAP, DEFAULT_RECORD_CAP};
use scribe_core::types::{AttemptId, ExportMeta, Provider};
use scribe_fusion::engine::SignalFusionEngine;
use scribe_fusion::types::{CanonicalSample, ReadinessDecision};
use scribe_lease::client::{LeaseClient, LeaseTransport};
use scribe_model::conversation::Conversation;
use scribe_model::export::CommonExport;
use scribe_model::title::is_generic_title;
use scribe_platforms::adapter::{ParsedPayload, TitleUpdate};
use scribe_platforms::registry::AdapterRegistry;
use scribe_protocol::frames::{InboundFrame, StreamDumpConfigFrame};
use scribe_protocol::token::FrameGate;

/// A conversation the runner currently holds, with its capture provenance.
#[derive(Debug, Clone)]
struct CachedCapture {
    provider: Provider,
    conversation: Conversation,
    meta: ExportMeta,
}

/// Controller-context runner: verifies bridge frames, drives the SFE,
/// maintains the conversation/preview caches, and orchestrates recovery.
pub struct Runner<F, S, L>
where
    F: WarmFetcher,
    S: SnapshotSource,
    L: LeaseTransport,
{
    gate: FrameGate,
    registry: AdapterRegistry,
    sfe: SignalFusionEngine,
    lease: LeaseClient<L>,
    fetcher: F,
    snapshots: S,
    config: ScribeConfig,
    conversations: BoundedMap<String, CachedCapture>,
    previews: BoundedMap<AttemptId, String>,
    decisions: BoundedMap<String, ReadinessDecision>,
}

impl<F, S, L> Runner<F, S, L>
where
    F: WarmFetcher,
    S: SnapshotSource,
    L: LeaseTransport,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScribeConfig,
        registry: AdapterRegistry,
        origin: impl Into<String>,
        session_token: impl Into<String>,
        lease_transport: L,
        fetcher: F,
        snapshots: S,
    ) -> Self {
        let lease = LeaseClient::new(lease_transport, config.lease.fail_open_ttl_ms);
        Self {
            gate: FrameGate::new(origin, session_token),
            registry,
            sfe: SignalFusionEngine::new(config.gate.clone()),
            lease,
            fetcher,
            snapshots,
            config,
            conversations: BoundedMap::new(DEFAULT_RECORD_CAP),
            previews: BoundedMap::new(DEFAULT_ATTEMPT_MAP_CAP),
            decisions: BoundedMap::new(DEFAULT_RECORD_CAP),
        }
    }

    pub fn session_token(&self) -> &str {
        self.gate.session_token()
    }

    /// Controller → page frame toggling raw stream dumps, stamped with the
    /// current session token.
    pub fn stream_dump_config(&self, enabled: bool) -> StreamDumpConfigFrame {
        StreamDumpConfigFrame::new(self.gate.session_token(), enabled)
    }

    /// One inbound bridge frame. Unverified or unknown frames are silently
    /// dropped; verified frames are routed by discriminator.
    pub fn handle_frame(&mut self, origin: &str, payload: Value, now_ms: u64) -> Vec<RunnerEvent> {
        let Ok(frame) = serde_json::from_value::<InboundFrame>(payload) else {
            return Vec::new();
        };
        if !self.gate.admits(origin, &frame) {
            debug!(frame_type = %frame.frame_type, %origin, "dropping unverified frame");
            return Vec::new();
        }

        if let Some(lifecycle) = frame.as_lifecycle() {
            let transition = self.sfe.ingest_lifecycle(
                &lifecycle.attempt_id,
                lifecycle.platform,
                lifecycle.phase,
                lifecycle.conversation_id.clone(),
            );
            if let Some(conv_id) = lifecycle
                .conversation_id
                .or_else(|| self.sfe.conversation_of(&lifecycle.attempt_id))
            {
                if transition.applied {
                    self.decisions
                        .insert(conv_id, self.sfe.decision(&lifecycle.attempt_id));
                }
            }
            return Vec::new();
        }

        if let Some(delta) = frame.as_stream_delta() {
            // Deltas from superseded attempts still update the preview; the
            // SFE alone refuses their readiness. Intentional asymmetry.
            let entry = self
                .previews
                .get_mut(&delta.attempt_id)
                .map(|text| {
                    text.push_str(&delta.text);
                })
                .is_some();
            if !entry {
                self.previews.insert(delta.attempt_id.clone(), delta.text);
            }
            return Vec::new();
        }

        if let Some(data) = frame.as_data_intercepted() {
            return self.on_data_intercepted(
                data.platform,
                &data.url,
                &data.data,
                data.attempt_id,
                now_ms,
            );
        }

        if let Some(disposed) = frame.as_attempt_disposed() {
            info!(attempt = %disposed.attempt_id, reason = %disposed.reason, "attempt disposed");
            self.sfe.dispose(&disposed.attempt_id);
            self.previews.remove(&disposed.attempt_id);
            if let Some(conv_id) = self.sfe.conversation_of(&disposed.attempt_id) {
                self.decisions
                    .insert(conv_id, ReadinessDecision::Terminated);
            }
            return Vec::new();
        }

        // STREAM_DUMP_CONFIG flows controller→page; anything else is noise.
        Vec::new()
    }

    fn on_data_intercepted(
        &mut self,
        platform: Provider,
        url: &str,
        data: &Value,
        attempt_id: AttemptId,
        now_ms: u64,
    ) -> Vec<RunnerEvent> {
        let Some(adapter) = self.registry.by_provider(platform) else {
            return Vec::new();
        };
        match adapter.parse_intercepted(data, url) {
            Some(ParsedPayload::Conversation(conv)) => self.ingest_conversation(
                platform,
                conv,
                ExportMeta::canonical(),
                Some(attempt_id),
                now_ms,
            ),
            Some(ParsedPayload::Titles(updates)) => self.on_title_updates(platform, updates),
            None => {
                // A completion trigger with no parseable body still means
                // "stream finished": ask for the full JSON.
                if adapter.is_completion_trigger(url) {
                    let conv_id = self
                        .sfe
                        .conversation_of(&attempt_id)
                        .or_else(|| adapter.extract_conversation_id_from_api_url(url));
                    if let Some(conversation_id) = conv_id {
                        return vec![RunnerEvent::WarmFetchRequested { conversation_id }];
                    }
                }
                Vec::new()
            }
        }
    }

    /// Warm-fetch the canonical payload for a conversation, trying the
    /// adapter's candidate URLs in order until one parses.
    pub async fn warm_fetch(&mut self, conversation_id: &str, now_ms: u64) -> Vec<RunnerEvent> {
        let platform = self
            .conversations
            .get(&conversation_id.to_string())
            .map(|c| c.provider)
            .or_else(|| {
                self.sfe
                    .attempt_for_conversation(conversation_id)
                    .map(|a| a.provider())
            })
            .unwrap_or(Provider::Unknown);
        let attempt_id = self
            .sfe
            .attempt_for_conversation(conversation_id)
            .unwrap_or_else(|| AttemptId::mint(platform));
        self.fetch_canonical(platform, conversation_id, attempt_id, now_ms)
            .await
    }

    async fn fetch_canonical(
        &mut self,
        platform: Provider,
        conv_id: &str,
        attempt_id: AttemptId,
        now_ms: u64,
    ) -> Vec<RunnerEvent> {
        let Some(adapter) = self.registry.by_provider(platform) else {
            return Vec::new();
        };
        let mut events = Vec::new();

        // A capture that is already complete canonical short-circuits the
        // network round trip and is re-offered instead.
        let cached_complete = self
            .conversations
            .get(&conv_id.to_string())
            .filter(|c| c.meta.is_complete_canonical())
            .map(|c| c.conversation.clone());
        if let Some(conversation) = cached_complete {
            events.extend(self.ingest_conversation(
                platform,
                conversation,
                ExportMeta::canonical(),
                Some(attempt_id),
                now_ms,
            ));
            return events;
        }

        let tuning = self.config.platforms.for_provider(platform);
        let attempts = tuning.warm_fetch_attempts as usize;
        for url in adapter.build_api_urls(conv_id).into_iter().take(attempts) {
            match self.fetcher.fetch(&url).await {
                Ok(body) => {
                    if let Some(ParsedPayload::Conversation(conv)) =
                        adapter.parse_intercepted(&Value::String(body), &url)
                    {
                        events.extend(self.ingest_conversation(
                            platform,
                            conv,
                            ExportMeta::canonical(),
                            Some(attempt_id),
                            now_ms,
                        ));
                        break;
                    }
                }
                Err(e) => {
                    warn!(%url, error = %e, "warm fetch candidate failed");
                }
            }
        }
        events
    }

    /// Apply published title events to every cache holding the conversation
    /// and re-announce captures whose only change is the title.
    fn on_title_updates(
        &mut self,
        platform: Provider,
        updates: Vec<TitleUpdate>,
    ) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        let adapter = self.registry.by_provider(platform);
        for update in updates {
            if let Some(adapter) = &adapter {
                adapter.apply_title(&update.conversation_id, &update.title);
            }
            let upgraded = self
                .conversations
                .get_mut(&update.conversation_id)
                .map(|cached| {
                    let was_generic = is_generic_title(&cached.conversation.title);
                    cached.conversation.title = update.title.clone();
                    was_generic && !is_generic_title(&update.title)
                })
                .unwrap_or(false);

            // A generic→specific upgrade on an already-ready conversation
            // re-announces the capture so subscribers learn the real title.
            if upgraded
                && self.decisions.get(&update.conversation_id)
                    == Some(&ReadinessDecision::CanonicalReady)
            {
                if let Some(capture) = self.ready_capture(&update.conversation_id) {
                    events.push(RunnerEvent::CanonicalReady(capture));
                }
            }
            events.push(RunnerEvent::TitleUpdated(update));
        }
        events
    }

    /// Cache a parsed conversation and, when eligible, offer it to the SFE
    /// as a canonical sample.
    fn ingest_conversation(
        &mut self,
        platform: Provider,
        conversation: Conversation,
        meta: ExportMeta,
        attempt_id: Option<AttemptId>,
        now_ms: u64,
    ) -> Vec<RunnerEvent> {
        let Some(adapter) = self.registry.by_provider(platform) else {
            return Vec::new();
        };
        if conversation.conversation_id.is_empty() || conversation.validate().is_err() {
            debug!(platform = %platform, "discarding conversation failing validation");
            return Vec::new();
        }
        let conv_id = conversation.conversation_id.clone();

        self.conversations.insert(
            conv_id.clone(),
            CachedCapture {
                provider: platform,
                conversation: conversation.clone(),
                meta,
            },
        );

        if !SignalFusionEngine::should_ingest_as_canonical_sample(&meta) {
            return Vec::new();
        }

        let attempt_id = attempt_id
            .or_else(|| self.sfe.attempt_for_conversation(&conv_id))
            .unwrap_or_else(|| AttemptId::mint(platform));

        let readiness = adapter.evaluate_readiness(&conversation);
        let sample = CanonicalSample {
            attempt_id: attempt_id.clone(),
            conversation_id: conv_id.clone(),
            timestamp_ms: now_ms,
            readiness,
        };
        let min_stable = self.config.platforms.for_provider(platform).min_stable_ms;
        let outcome = self
            .sfe
            .apply_canonical_sample_with_window(&sample, min_stable);
        self.decisions.insert(conv_id.clone(), outcome.decision);

        let mut events = Vec::new();
        match outcome.decision {
            ReadinessDecision::CanonicalReady if outcome.ready => {
                if let Some(capture) = self.ready_capture(&conv_id) {
                    events.push(RunnerEvent::CanonicalReady(capture));
                }
            }
            ReadinessDecision::DegradedReady => {
                events.push(RunnerEvent::DegradedReady {
                    conversation_id: conv_id,
                });
            }
            _ => {}
        }
        events
    }

    fn ready_capture(&self, conversation_id: &str) -> Option<ReadyCapture> {
        let cached = self.conversations.get(&conversation_id.to_string())?;
        let attempt_id = self
            .sfe
            .attempt_for_conversation(conversation_id)
            .unwrap_or_else(|| AttemptId::mint(cached.provider));
        Some(ReadyCapture {
            conversation_id: conversation_id.to_string(),
            provider: cached.provider,
            conversation: cached.conversation.clone(),
            attempt_id,
            capture_meta: cached.meta,
            content_hash: cached.conversation.content_hash(),
        })
    }

    /// Visibility recovery: when the tab surfaces and the conversation is
    /// not canonical-ready, take a degraded snapshot and warm-fetch the
    /// canonical payload. Runs at most once per visibility event (the
    /// caller invokes it per event).
    pub async fn recover_visibility(&mut self, page_url: &str, now_ms: u64) -> Vec<RunnerEvent> {
        let Some(adapter) = self.registry.for_page_url(page_url) else {
            return Vec::new();
        };
        let Some(conv_id) = adapter.extract_conversation_id(page_url) else {
            return Vec::new();
        };
        if self.decisions.get(&conv_id) == Some(&ReadinessDecision::CanonicalReady) {
            return Vec::new();
        }
        let platform = adapter.provider();

        let attempt_id = self
            .sfe
            .attempt_for_conversation(&conv_id)
            .unwrap_or_else(|| AttemptId::mint(platform));

        // The probe lease keeps sibling tabs from racing the same
        // conversation; a transport failure fails open by design.
        let lease = self
            .lease
            .claim(
                &conv_id,
                &attempt_id,
                self.config.lease.default_ttl_ms,
                now_ms,
            )
            .await;
        if !lease.acquired {
            debug!(conversation = %conv_id, owner = %lease.owner_attempt_id,
                   "probe lease held elsewhere, skipping recovery");
            return Vec::new();
        }

        let mut events = Vec::new();

        // (a) Degraded DOM snapshot, ingested but never offered to the SFE.
        // Platforms whose DOM churns can disable this source outright.
        if self
            .config
            .platforms
            .for_provider(platform)
            .source_enabled("dom-snapshot")
        {
            match self.snapshots.capture(&conv_id).await {
                Ok(Some(snapshot)) if snapshot.validate().is_ok() => {
                    events.extend(self.ingest_conversation(
                        platform,
                        snapshot,
                        ExportMeta::degraded(),
                        Some(attempt_id.clone()),
                        now_ms,
                    ));
                }
                Ok(_) => {}
                Err(e) => warn!(conversation = %conv_id, error = %e, "snapshot capture failed"),
            }
        }

        // (b) Warm fetch of the canonical payload.
        events.extend(
            self.fetch_canonical(platform, &conv_id, attempt_id.clone(), now_ms)
                .await,
        );

        if !lease.fail_open {
            self.lease.release(&conv_id, &attempt_id).await;
        }
        events
    }

    pub fn export_state(&self, conversation_id: &str) -> ExportState {
        self.decisions
            .get(&conversation_id.to_string())
            .copied()
            .map(ExportState::from_decision)
            .unwrap_or_default()
    }

    /// The flat latest-turn export for downstream consumers.
    pub fn common_export(&self, conversation_id: &str) -> Option<CommonExport> {
        let cached = self.conversations.get(&conversation_id.to_string())?;
        let display = self
            .registry
            .by_provider(cached.provider)
            .map(|a| a.display_name().to_string())
            .unwrap_or_else(|| cached.provider.to_string());
        Some(CommonExport::from_conversation(&cached.conversation, &display))
    }

    pub fn export_filename(&self, conversation_id: &str) -> Option<String> {
        let cached = self.conversations.get(&conversation_id.to_string())?;
        self.registry
            .by_provider(cached.provider)
            .map(|a| a.format_filename(&cached.conversation))
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .get(&conversation_id.to_string())
            .map(|c| &c.conversation)
    }

    pub fn preview(&self, attempt_id: &AttemptId) -> Option<&str> {
        self.previews.get(attempt_id).map(String::as_str)
    }
}
