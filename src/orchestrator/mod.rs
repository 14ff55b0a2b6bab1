//! The tick loop and the snapshot it persists.
//!
//! A tick is evaluated in a fixed order: circuit breakers, then slot
//! filling (promotion or discovery), then one phase of the active task.
//! The snapshot is written after every tick so a killed process resumes
//! from its last completed tick.

pub mod runner;
pub mod state;
pub mod summary;

pub use runner::Orchestrator;
pub use state::{LoadOutcome, OrchestratorState, RunLock, RunStats, STATE_VERSION, StateStore};
pub use summary::{ActiveTaskSummary, RunOutcome, RunSummary, StatusReport, TickOutcome};
