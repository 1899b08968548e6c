//! Retry state machine
//!
//! One request walks this machine from `Lookup` to a terminal state. The
//! graph has no edge back into `Execute` or `Diagnose` after the retry, so
//! a request gets at most one diagnose-and-retry cycle.

use crate::errors::{AssistError, Result};
use serde::{Deserialize, Serialize};

/// Per-request states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryState {
    /// Consulting the command cache
    Lookup,

    /// A cached command was selected
    UseCached,

    /// Asking the generator for a command
    Generate,

    /// Running the first command
    Execute,

    /// First command failed; looking for an alternative
    Diagnose,

    /// Running the alternative
    Reexecute,

    /// A command succeeded (terminal)
    Succeeded,

    /// No command succeeded (terminal)
    Failed,
}

/// Events that drive the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    CacheHit,
    CacheMiss,
    CommandReady,
    ExecutionSucceeded,
    ExecutionFailed,
    AlternativeReady,
    NoAlternative,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::Failed)
    }

    /// Apply `event`.
    ///
    /// Valid transitions:
    /// 1.  Lookup    → UseCached  (on: CacheHit)
    /// 2.  Lookup    → Generate   (on: CacheMiss)
    /// 3.  UseCached → Execute    (on: CommandReady)
    /// 4.  Generate  → Execute    (on: CommandReady)
    /// 5.  Execute   → Succeeded  (on: ExecutionSucceeded)
    /// 6.  Execute   → Diagnose   (on: ExecutionFailed)
    /// 7.  Diagnose  → Reexecute  (on: AlternativeReady)
    /// 8.  Diagnose  → Failed     (on: NoAlternative)
    /// 9.  Reexecute → Succeeded  (on: ExecutionSucceeded)
    /// 10. Reexecute → Failed     (on: ExecutionFailed)
    ///
    /// Terminal states reject every event.
    pub fn transition(&self, event: RetryEvent) -> Result<RetryState> {
        use RetryEvent::*;
        use RetryState::*;

        let next = match (self, event) {
            (Lookup, CacheHit) => UseCached,
            (Lookup, CacheMiss) => Generate,

            (UseCached, CommandReady) => Execute,
            (Generate, CommandReady) => Execute,

            (Execute, ExecutionSucceeded) => Succeeded,
            (Execute, ExecutionFailed) => Diagnose,

            (Diagnose, AlternativeReady) => Reexecute,
            (Diagnose, NoAlternative) => Failed,

            (Reexecute, ExecutionSucceeded) => Succeeded,
            (Reexecute, ExecutionFailed) => Failed,

            (from, event) => {
                return Err(AssistError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                    reason: if from.is_terminal() {
                        "request already finished".to_string()
                    } else {
                        format!("no transition from {:?} on {:?}", from, event)
                    },
                });
            }
        };

        Ok(next)
    }

    /// Events accepted in this state
    pub fn valid_events(&self) -> Vec<RetryEvent> {
        use RetryEvent::*;
        use RetryState::*;

        match self {
            Lookup => vec![CacheHit, CacheMiss],
            UseCached | Generate => vec![CommandReady],
            Execute | Reexecute => vec![ExecutionSucceeded, ExecutionFailed],
            Diagnose => vec![AlternativeReady, NoAlternative],
            Succeeded | Failed => vec![],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RetryState::Lookup => "Checking cache",
            RetryState::UseCached => "Using cached command",
            RetryState::Generate => "Generating command",
            RetryState::Execute => "Executing",
            RetryState::Diagnose => "Looking for an alternative",
            RetryState::Reexecute => "Retrying",
            RetryState::Succeeded => "Succeeded",
            RetryState::Failed => "Failed",
        }
    }
}
