pub mod engine;
pub mod snapshot;

pub use engine::{HistoryEngine, HistoryPhase};
pub use snapshot::Snapshot;
