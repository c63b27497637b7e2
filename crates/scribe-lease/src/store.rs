use std::collections::HashMap;

use tracing::debug;

use scribe_core::types::AttemptId;
use scribe_protocol::lease::{
    LeaseClaimFrame, LeaseClaimResultFrame, LeaseReleaseFrame, LeaseReleaseResultFrame,
};

/// One granted probe lease.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeLease {
    pub attempt_id: AttemptId,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    pub acquired: bool,
    pub owner_attempt_id: AttemptId,
    pub expires_at_ms: u64,
}

/// Owner-process lease store: at most one attempt per conversation drives
/// readiness probing. Single-owner; callers serialize through the owner's
/// loop, so no interior locking here.
#[derive(Debug, Default)]
pub struct LeaseStore {
    leases: HashMap<String, ProbeLease>,
}

impl LeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire when there is no record, the record expired, or the record
    /// already belongs to the requester (self-refresh). Otherwise report
    /// the current owner.
    pub fn claim(
        &mut self,
        conversation_id: &str,
        attempt_id: &AttemptId,
        ttl_ms: u64,
        now_ms: u64,
    ) -> ClaimOutcome {
        let current = self.leases.get(conversation_id);
        let grantable = match current {
            None => true,
            Some(lease) => lease.expires_at_ms <= now_ms || lease.attempt_id == *attempt_id,
        };

        if grantable {
            let expires_at_ms = now_ms + ttl_ms;
            self.leases.insert(
                conversation_id.to_string(),
                ProbeLease {
                    attempt_id: attempt_id.clone(),
                    expires_at_ms,
                },
            );
            debug!(conversation = conversation_id, attempt = %attempt_id, expires_at_ms,
                   "probe lease granted");
            ClaimOutcome {
                acquired: true,
                owner_attempt_id: attempt_id.clone(),
                expires_at_ms,
            }
        } else {
            let lease = current.expect("non-grantable implies a live record");
            ClaimOutcome {
                acquired: false,
                owner_attempt_id: lease.attempt_id.clone(),
                expires_at_ms: lease.expires_at_ms,
            }
        }
    }

    /// Release only succeeds for the current owner.
    pub fn release(&mut self, conversation_id: &str, attempt_id: &AttemptId) -> bool {
        match self.leases.get(conversation_id) {
            Some(lease) if lease.attempt_id == *attempt_id => {
                self.leases.remove(conversation_id);
                debug!(conversation = conversation_id, attempt = %attempt_id,
                       "probe lease released");
                true
            }
            _ => false,
        }
    }

    pub fn owner(&self, conversation_id: &str, now_ms: u64) -> Option<&ProbeLease> {
        self.leases
            .get(conversation_id)
            .filter(|l| l.expires_at_ms > now_ms)
    }

    /// RPC adapter: claim frame in, result frame out.
    pub fn handle_claim(&mut self, frame: &LeaseClaimFrame, now_ms: u64) -> LeaseClaimResultFrame {
        let outcome = self.claim(
            &frame.conversation_id,
            &frame.attempt_id,
            frame.ttl_ms,
            now_ms,
        );
        LeaseClaimResultFrame::new(
            outcome.acquired,
            outcome.owner_attempt_id,
            outcome.expires_at_ms,
        )
    }

    pub fn handle_release(&mut self, frame: &LeaseReleaseFrame) -> LeaseReleaseResultFrame {
        LeaseReleaseResultFrame::new(self.release(&frame.conversation_id, &frame.attempt_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aid(s: &str) -> AttemptId {
        AttemptId::from(s)
    }

    #[test]
    fn exclusion_and_owner_release() {
        // S6: second claimant is told who owns the lease; only the owner
        // can release.
        let mut store = LeaseStore::new();
        let granted = store.claim("c1", &aid("a1"), 5000, 0);
        assert!(granted.acquired);
        assert_eq!(granted.expires_at_ms, 5000);

        let denied = store.claim("c1", &aid("a2"), 5000, 100);
        assert!(!denied.acquired);
        assert_eq!(denied.owner_attempt_id, aid("a1"));

        assert!(!store.release("c1", &aid("a2")));
        assert!(store.release("c1", &aid("a1")));
        assert!(store.claim("c1", &aid("a2"), 5000, 200).acquired);
    }

    #[test]
    fn expired_lease_is_grantable() {
        let mut store = LeaseStore::new();
        store.claim("c1", &aid("a1"), 1000, 0);
        let takeover = store.claim("c1", &aid("a2"), 1000, 1000);
        assert!(takeover.acquired);
        assert_eq!(takeover.owner_attempt_id, aid("a2"));
    }

    #[test]
    fn self_refresh_extends() {
        let mut store = LeaseStore::new();
        store.claim("c1", &aid("a1"), 1000, 0);
        let refreshed = store.claim("c1", &aid("a1"), 1000, 500);
        assert!(refreshed.acquired);
        assert_eq!(refreshed.expires_at_ms, 1500);
    }

    #[test]
    fn release_on_missing_record_is_false() {
        let mut store = LeaseStore::new();
        assert!(!store.release("nope", &aid("a1")));
    }

    #[test]
    fn rpc_frames_round_trip() {
        let mut store = LeaseStore::new();
        let claim = LeaseClaimFrame::new("c1", aid("a1"), 5000);
        let result = store.handle_claim(&claim, 0);
        assert!(result.acquired);

        let release = LeaseReleaseFrame::new("c1", aid("a1"));
        assert!(store.handle_release(&release).released);
        assert!(!store.handle_release(&release).released);
    }
}
