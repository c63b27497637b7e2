pub mod client;
pub mod store;

pub use client::{ClaimedLease, LeaseClient, LeaseTransport};
pub use store::{ClaimOutcome, LeaseStore, ProbeLease};
