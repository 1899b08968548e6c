//! aishell - natural-language shell assistant
//!
//! Turns a request into a shell command with a local Ollama model, runs it,
//! and learns from the outcome.
//!
//! # Architecture
//!
//! - **learning**: similarity scoring, the command cache and the failure memory
//! - **orchestrator**: the retry state machine tying the stores to generation and execution
//! - **generator** / **executor** / **conversation**: collaborators behind narrow traits
//! - **cli** / **bootstrap** / **environment**: configuration, setup and host detection

pub mod errors;

pub mod learning;
pub mod orchestrator;

pub mod conversation;
pub mod executor;
pub mod generator;

pub mod bootstrap;
pub mod cli;
pub mod environment;

// Re-export commonly used types
pub use errors::{AssistError, Result};
pub use learning::{CommandCache, FailureMemory};
pub use orchestrator::{RetryOrchestrator, RunReport};
