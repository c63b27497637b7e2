use async_trait::async_trait;
use tracing::{debug, warn};

use scribe_core::error::ScribeError;
use scribe_model::conversation::Conversation;

/// Fetches a conversation payload URL during warm-fetch recovery.
#[async_trait]
pub trait WarmFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScribeError>;
}

/// Production fetcher riding the page's cookie jar is out of scope; this
/// one covers the daemon and tests that point at a reachable endpoint.
pub struct HttpWarmFetcher {
    client: reqwest::Client,
}

impl HttpWarmFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWarmFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WarmFetcher for HttpWarmFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScribeError> {
        debug!(%url, "warm fetch");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScribeError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "warm fetch non-success");
            return Err(ScribeError::Transport(format!(
                "warm fetch returned {status}"
            )));
        }
        resp.text()
            .await
            .map_err(|e| ScribeError::Transport(e.to_string()))
    }
}

/// Produces a degraded DOM-snapshot conversation when the page can still
/// render one. The DOM scraping itself lives outside the core; the runner
/// only consumes its result.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn capture(&self, conversation_id: &str) -> Result<Option<Conversation>, ScribeError>;
}

/// Snapshot source for contexts with no DOM at all.
pub struct NoSnapshot;

#[async_trait]
impl SnapshotSource for NoSnapshot {
    async fn capture(&self, _conversation_id: &str) -> Result<Option<Conversation>, ScribeError> {
        Ok(None)
    }
}
