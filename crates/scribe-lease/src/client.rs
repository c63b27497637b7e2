use async_trait::async_trait;
use tracing::warn;

use scribe_core::error::ScribeError;
use scribe_core::types::AttemptId;
use scribe_protocol::lease::{
    LeaseClaimFrame, LeaseClaimResultFrame, LeaseReleaseFrame, LeaseReleaseResultFrame,
};

/// Transport to the owner process's lease store.
#[async_trait]
pub trait LeaseTransport: Send + Sync {
    async fn claim(&self, frame: LeaseClaimFrame) -> Result<LeaseClaimResultFrame, ScribeError>;
    async fn release(
        &self,
        frame: LeaseReleaseFrame,
    ) -> Result<LeaseReleaseResultFrame, ScribeError>;
}

/// A claim as the runner sees it, including the fail-open case.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedLease {
    pub acquired: bool,
    pub owner_attempt_id: AttemptId,
    pub expires_at_ms: u64,
    /// True when the owner was unreachable and the claim was assumed
    /// granted with a client-side TTL.
    pub fail_open: bool,
}

/// Runner-side lease client.
///
/// Claims FAIL OPEN on transport error: probing proceeds with a local TTL.
/// This is a deliberate availability bias; it is safe because readiness is
/// still gated by content-hash stability, which prevents double-firing
/// across tabs even when two of them believe they hold the lease.
pub struct LeaseClient<T: LeaseTransport> {
    transport: T,
    fail_open_ttl_ms: u64,
}

impl<T: LeaseTransport> LeaseClient<T> {
    pub fn new(transport: T, fail_open_ttl_ms: u64) -> Self {
        Self {
            transport,
            fail_open_ttl_ms,
        }
    }

    pub async fn claim(
        &self,
        conversation_id: &str,
        attempt_id: &AttemptId,
        ttl_ms: u64,
        now_ms: u64,
    ) -> ClaimedLease {
        let frame = LeaseClaimFrame::new(conversation_id, attempt_id.clone(), ttl_ms);
        match self.transport.claim(frame).await {
            Ok(result) => ClaimedLease {
                acquired: result.acquired,
                owner_attempt_id: result.owner_attempt_id,
                expires_at_ms: result.expires_at_ms,
                fail_open: false,
            },
            Err(e) => {
                warn!(conversation = conversation_id, attempt = %attempt_id, error = %e,
                      "lease claim transport failed, failing open");
                ClaimedLease {
                    acquired: true,
                    owner_attempt_id: attempt_id.clone(),
                    expires_at_ms: now_ms + self.fail_open_ttl_ms,
                    fail_open: true,
                }
            }
        }
    }

    /// Release is best-effort; a transport failure just logs.
    pub async fn release(&self, conversation_id: &str, attempt_id: &AttemptId) -> bool {
        let frame = LeaseReleaseFrame::new(conversation_id, attempt_id.clone());
        match self.transport.release(frame).await {
            Ok(result) => result.released,
            Err(e) => {
                warn!(conversation = conversation_id, attempt = %attempt_id, error = %e,
                      "lease release transport failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LeaseStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory transport over a real store, with a switchable outage.
    struct LocalTransport {
        store: Arc<Mutex<LeaseStore>>,
        now_ms: u64,
        down: AtomicBool,
    }

    #[async_trait]
    impl LeaseTransport for LocalTransport {
        async fn claim(
            &self,
            frame: LeaseClaimFrame,
        ) -> Result<LeaseClaimResultFrame, ScribeError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ScribeError::Transport("owner unreachable".into()));
            }
            Ok(self.store.lock().unwrap().handle_claim(&frame, self.now_ms))
        }

        async fn release(
            &self,
            frame: LeaseReleaseFrame,
        ) -> Result<LeaseReleaseResultFrame, ScribeError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ScribeError::Transport("owner unreachable".into()));
            }
            Ok(self.store.lock().unwrap().handle_release(&frame))
        }
    }

    fn client(down: bool) -> LeaseClient<LocalTransport> {
        LeaseClient::new(
            LocalTransport {
                store: Arc::new(Mutex::new(LeaseStore::new())),
                now_ms: 0,
                down: AtomicBool::new(down),
            },
            15_000,
        )
    }

    #[tokio::test]
    async fn claim_through_transport() {
        let c = client(false);
        let a1 = AttemptId::from("a1");
        let lease = c.claim("c1", &a1, 5000, 0).await;
        assert!(lease.acquired);
        assert!(!lease.fail_open);

        let a2 = AttemptId::from("a2");
        let denied = c.claim("c1", &a2, 5000, 0).await;
        assert!(!denied.acquired);
        assert_eq!(denied.owner_attempt_id, a1);

        assert!(!c.release("c1", &a2).await);
        assert!(c.release("c1", &a1).await);
    }

    #[tokio::test]
    async fn transport_failure_fails_open() {
        let c = client(true);
        let a1 = AttemptId::from("a1");
        let lease = c.claim("c1", &a1, 5000, 1_000).await;
        assert!(lease.acquired);
        assert!(lease.fail_open);
        assert_eq!(lease.expires_at_ms, 16_000);
        assert_eq!(lease.owner_attempt_id, a1);

        // Release during the outage is a quiet no-op.
        assert!(!c.release("c1", &a1).await);
    }
}
