pub mod bounded;
pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use bounded::BoundedMap;
pub use config::ScribeConfig;
pub use error::{Result, ScribeError};
pub use types::{
    AttemptId, CaptureSource, Completeness, ConversationId, ExportMeta, Fidelity,
    PlatformReadiness, Provider, ReadinessReason,
};
