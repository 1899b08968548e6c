//! Progress events emitted while a command runs

use crate::executor::ExecutionOutput;
use crate::orchestrator::classify::Classification;

/// Lifecycle events of one run, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A command is about to run; `attempt` starts at 1
    Executing { command: String, attempt: usize },

    /// A command finished
    Executed {
        command: String,
        output: ExecutionOutput,
        classification: Classification,
    },

    /// Asking the generator for an alternative command
    SeekingAlternative,

    /// No usable alternative was produced
    NoAlternative,

    /// Asking the generator to diagnose an execution
    Diagnosing,
}
