//! Text generation backend
//!
//! The orchestrator only sees the `Generator` trait; `OllamaGenerator` is the
//! production implementation talking to a local Ollama server.

pub mod client;
pub mod parser;

pub use client::OllamaGenerator;
pub use parser::{clean_command, Diagnosis};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Turns a prompt into text.
///
/// Implementations own their transport and timeout policy; a non-success
/// response must surface as `AssistError::GenerationFailure`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply to `request` under `system_prompt`, after `history`
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        request: &str,
    ) -> Result<String>;

    /// Model identifier, for display
    fn model(&self) -> &str;
}
