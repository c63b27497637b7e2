pub mod recovery;
pub mod runner;
pub mod types;

pub use recovery::{HttpWarmFetcher, NoSnapshot, SnapshotSource, WarmFetcher};
pub use runner::Runner;
pub use types::{ExportState, ReadyCapture, RunnerEvent};
