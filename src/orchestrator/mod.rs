//! Retry orchestration
//!
//! The control loop around the learning stores: cache lookup, generation,
//! execution, outcome classification and one auto-fix cycle.

pub mod classify;
pub mod events;
pub mod prompts;
pub mod retry;
pub mod state;

pub use classify::{classify, Classification, FailurePolicy};
pub use events::RunEvent;
pub use retry::{Attempt, OrchestratorConfig, PreparedCommand, RetryOrchestrator, RunReport};
pub use state::{RetryEvent, RetryState};
