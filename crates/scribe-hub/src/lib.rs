pub mod hub;
pub mod store;
pub mod types;

pub use hub::{EventHub, SubscriberPort};
pub use store::{MemoryStore, SnapshotStore, SqliteStore, StoreError};
pub use types::{
    CachedConversationRecord, ConversationEvent, EventKind, ExportFormat, ExternalRequest,
    ExternalResponse, IngestCapture, PersistedState, EXTERNAL_API_VERSION, EXTERNAL_PORT_NAME,
};
