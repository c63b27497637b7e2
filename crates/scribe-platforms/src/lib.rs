pub mod adapter;
pub mod chatgpt;
pub mod gemini;
pub mod grok;
pub mod registry;
pub mod sse;

pub use adapter::{ParsedPayload, PlatformAdapter, TitleUpdate};
pub use chatgpt::ChatgptAdapter;
pub use gemini::GeminiAdapter;
pub use grok::GrokAdapter;
pub use registry::AdapterRegistry;
