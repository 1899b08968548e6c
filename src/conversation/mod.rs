//! Conversation record
//!
//! Each finished request becomes one `Turn`, rendered into the transcript as
//! `USER: <request> ||| ASSISTANT: <command> ||| RESULT: <outcome>`. Recent
//! turns are replayed to the generator as chat history.

pub mod store;

pub use store::{parse_transcript, JsonConversationStore, SessionContext};

use crate::errors::Result;
use crate::generator::ChatMessage;
use std::fmt;

/// Separator between transcript segments
pub const SEGMENT_SEPARATOR: &str = "|||";

/// Outcome of a finished turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    Success,
    Failed { exit_code: i32, error: String },
}

/// One request and the command that answered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub request: String,
    pub command: String,
    pub result: TurnResult,
}

impl Turn {
    pub fn success(request: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            command: command.into(),
            result: TurnResult::Success,
        }
    }

    pub fn failed(
        request: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            command: command.into(),
            result: TurnResult::Failed {
                exit_code,
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == TurnResult::Success
    }
}

impl fmt::Display for TurnResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnResult::Success => write!(f, "[SUCCESS]"),
            TurnResult::Failed { exit_code, error } => {
                // Keep the record on one line and free of separators
                let error = error
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .replace(SEGMENT_SEPARATOR, "|");
                write!(f, "[FAILED: exit={} error={}]", exit_code, error)
            }
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "USER: {} {sep} ASSISTANT: {} {sep} RESULT: {}",
            self.request,
            self.command,
            self.result,
            sep = SEGMENT_SEPARATOR
        )
    }
}

/// Persistent record of past turns
pub trait ConversationStore: Send {
    /// Append one finished turn
    fn append(&mut self, turn: &Turn) -> Result<()>;

    /// Chat history of the last `max_exchanges` exchanges, oldest first
    fn history(&self, max_exchanges: usize) -> Vec<ChatMessage>;
}
