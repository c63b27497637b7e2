use serde::{Deserialize, Serialize};

use scribe_core::types::AttemptId;

pub const TYPE_PROBE_LEASE_CLAIM: &str = "PROBE_LEASE_CLAIM";
pub const TYPE_PROBE_LEASE_CLAIM_RESULT: &str = "PROBE_LEASE_CLAIM_RESULT";
pub const TYPE_PROBE_LEASE_RELEASE: &str = "PROBE_LEASE_RELEASE";
pub const TYPE_PROBE_LEASE_RELEASE_RESULT: &str = "PROBE_LEASE_RELEASE_RESULT";

/// Runner → owner: request the exclusive right to drive readiness probing
/// for a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseClaimFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub conversation_id: String,
    pub attempt_id: AttemptId,
    pub ttl_ms: u64,
}

impl LeaseClaimFrame {
    pub fn new(conversation_id: impl Into<String>, attempt_id: AttemptId, ttl_ms: u64) -> Self {
        Self {
            frame_type: TYPE_PROBE_LEASE_CLAIM.to_string(),
            conversation_id: conversation_id.into(),
            attempt_id,
            ttl_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseClaimResultFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub acquired: bool,
    /// The attempt currently holding the lease (the requester on success).
    pub owner_attempt_id: AttemptId,
    pub expires_at_ms: u64,
}

impl LeaseClaimResultFrame {
    pub fn new(acquired: bool, owner_attempt_id: AttemptId, expires_at_ms: u64) -> Self {
        Self {
            frame_type: TYPE_PROBE_LEASE_CLAIM_RESULT.to_string(),
            acquired,
            owner_attempt_id,
            expires_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseReleaseFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub conversation_id: String,
    pub attempt_id: AttemptId,
}

impl LeaseReleaseFrame {
    pub fn new(conversation_id: impl Into<String>, attempt_id: AttemptId) -> Self {
        Self {
            frame_type: TYPE_PROBE_LEASE_RELEASE.to_string(),
            conversation_id: conversation_id.into(),
            attempt_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseReleaseResultFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub released: bool,
}

impl LeaseReleaseResultFrame {
    pub fn new(released: bool) -> Self {
        Self {
            frame_type: TYPE_PROBE_LEASE_RELEASE_RESULT.to_string(),
            released,
        }
    }
}
