//! Execution outcome classification

use crate::executor::ExecutionOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When an execution counts as failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail iff the exit code is non-zero; stderr on success is triaged
    #[default]
    ExitCode,

    /// Fail on a non-zero exit code or any stderr output
    Strict,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::ExitCode => "exit_code",
            FailurePolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exit_code" => Ok(FailurePolicy::ExitCode),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!(
                "unknown failure policy '{}' (expected 'exit_code' or 'strict')",
                other
            )),
        }
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Exit code 0 with output on stderr
    SuccessWithStderr,
    Failure,
}

impl Classification {
    pub fn is_failure(&self) -> bool {
        *self == Classification::Failure
    }
}

/// Classify `output` under `policy`
pub fn classify(policy: FailurePolicy, output: &ExecutionOutput) -> Classification {
    if output.exit_code != 0 {
        return Classification::Failure;
    }

    match (policy, output.has_stderr()) {
        (_, false) => Classification::Success,
        (FailurePolicy::ExitCode, true) => Classification::SuccessWithStderr,
        (FailurePolicy::Strict, true) => Classification::Failure,
    }
}
