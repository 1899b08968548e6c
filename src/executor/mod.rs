//! Command execution
//!
//! Implementations must drain stdout and stderr concurrently while the child
//! runs, otherwise a chatty child can block on a full pipe.

pub mod shell;

pub use shell::{sanitize_command, ShellExecutor, ShellKind};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Exit code reported when no process status is available
pub const NO_EXIT_CODE: i32 = -1;

/// Captured result of one command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Process exit status
    pub exit_code: i32,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    /// Output for a command that never produced a process status
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self::new(NO_EXIT_CODE, "", reason)
    }

    /// Whether anything was written to stderr
    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }

    /// Best short description of what went wrong
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("Command exited with code {}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Runs shell commands
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecutionOutput>;
}
