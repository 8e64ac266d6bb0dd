pub mod engine;
pub mod recovery;

pub use engine::{Engine, EngineEvent, FlowSummary, Mode, StatusSnapshot};
pub use recovery::RecoveryOutcome;
