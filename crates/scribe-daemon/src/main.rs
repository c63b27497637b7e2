use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use scribe_core::config::ScribeConfig;
use scribe_core::error::ScribeError;
use scribe_hub::hub::{EventHub, SubscriberPort};
use scribe_hub::store::SqliteStore;
use scribe_hub::types::{ConversationEvent, IngestCapture, EXTERNAL_PORT_NAME};
use scribe_lease::client::LeaseTransport;
use scribe_lease::store::LeaseStore;
use scribe_platforms::registry::AdapterRegistry;
use scribe_protocol::lease::{
    LeaseClaimFrame, LeaseClaimResultFrame, LeaseReleaseFrame, LeaseReleaseResultFrame,
};
use scribe_protocol::token::mint_session_token;
use scribe_runner::recovery::{HttpWarmFetcher, NoSnapshot};
use scribe_runner::runner::Runner;
use scribe_runner::types::RunnerEvent;

/// Conversation capture pipeline: reads bridge frames and pull-API requests
/// as NDJSON on stdin, emits subscriber events and responses on stdout.
#[derive(Parser, Debug)]
#[command(name = "scribe-daemon")]
struct Args {
    /// Path to scribe.toml (default: ~/.scribe/scribe.toml).
    #[arg(long)]
    config: Option<String>,

    /// Page origin the frame gate accepts.
    #[arg(long, default_value = "https://chatgpt.com")]
    origin: String,
}

/// In-process transport to the owner's lease store.
struct LocalLeaseTransport {
    store: Arc<Mutex<LeaseStore>>,
    started: Instant,
}

#[async_trait]
impl LeaseTransport for LocalLeaseTransport {
    async fn claim(&self, frame: LeaseClaimFrame) -> Result<LeaseClaimResultFrame, ScribeError> {
        let now_ms = self.started.elapsed().as_millis() as u64;
        Ok(self.store.lock().unwrap().handle_claim(&frame, now_ms))
    }

    async fn release(
        &self,
        frame: LeaseReleaseFrame,
    ) -> Result<LeaseReleaseResultFrame, ScribeError> {
        Ok(self.store.lock().unwrap().handle_release(&frame))
    }
}

/// Subscriber port that prints events as NDJSON on stdout.
struct StdoutPort;

impl SubscriberPort for StdoutPort {
    fn name(&self) -> &str {
        EXTERNAL_PORT_NAME
    }

    fn post(&self, event: &ConversationEvent) -> Result<(), ScribeError> {
        let line = serde_json::to_string(event)?;
        println!("{line}");
        Ok(())
    }

    fn disconnect(&self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_daemon=info,scribe_runner=info,scribe_hub=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ScribeConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ScribeConfig::default()
    });

    if let Some(parent) = Path::new(&config.hub.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&config.hub.db_path)
        .map_err(|e| anyhow::anyhow!("opening hub store: {e}"))?;
    let mut hub = EventHub::new(Box::new(store), config.hub.clone());
    hub.ensure_hydrated();
    hub.connect(Box::new(StdoutPort));

    let lease_store = Arc::new(Mutex::new(LeaseStore::new()));
    let started = Instant::now();
    let session_token = mint_session_token();
    info!(origin = %args.origin, "scribe daemon ready");

    let mut runner = Runner::new(
        config.clone(),
        AdapterRegistry::with_defaults(),
        args.origin.clone(),
        session_token,
        LocalLeaseTransport {
            store: lease_store,
            started,
        },
        HttpWarmFetcher::new(),
        NoSnapshot,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut flush_tick = tokio::time::interval(tokio::time::Duration::from_millis(
        config.hub.persist_debounce_ms.max(100),
    ));

    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break; // stdin closed
                };
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                if value.get("op").is_some() {
                    let response = hub.handle_external_request(&value, now_ms);
                    println!("{}", serde_json::to_string(&response)?);
                    continue;
                }
                let origin = value
                    .get("origin")
                    .and_then(Value::as_str)
                    .unwrap_or(&args.origin)
                    .to_string();
                let frame = value.get("frame").cloned().unwrap_or(value);
                let mut queue = runner.handle_frame(&origin, frame, now_ms);
                while let Some(event) = queue.pop() {
                    if let RunnerEvent::WarmFetchRequested { conversation_id } = &event {
                        queue.extend(runner.warm_fetch(conversation_id, now_ms).await);
                        continue;
                    }
                    dispatch(&mut hub, event, now_ms);
                }
            }
            _ = flush_tick.tick() => {
                hub.maybe_flush(now_ms);
            }
        }
    }

    hub.flush_persist();
    info!("scribe daemon stopped");
    Ok(())
}

fn dispatch(hub: &mut EventHub, event: RunnerEvent, now_ms: u64) {
    match event {
        RunnerEvent::CanonicalReady(capture) => {
            hub.ingest(
                IngestCapture {
                    conversation_id: capture.conversation_id,
                    provider: capture.provider,
                    payload: capture.conversation,
                    attempt_id: Some(capture.attempt_id),
                    capture_meta: capture.capture_meta,
                    content_hash: capture.content_hash,
                    tab_id: None,
                },
                now_ms,
            );
        }
        RunnerEvent::DegradedReady { conversation_id } => {
            info!(conversation = %conversation_id, "degraded-ready; force-save only");
        }
        RunnerEvent::TitleUpdated(update) => {
            info!(conversation = %update.conversation_id, title = %update.title,
                  "conversation title updated");
        }
        // Resolved by the caller before dispatch.
        RunnerEvent::WarmFetchRequested { .. } => {}
    }
}
