//! Ollama chat client
//!
//! Endpoint: POST /api/chat with `stream: false`; the reply text is read from
//! `message.content`.

use crate::errors::{AssistError, Result};
use crate::generator::{ChatMessage, Generator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama chat generator
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create generator with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, REQUEST_TIMEOUT)
    }

    /// Create generator with custom configuration
    pub fn with_config(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AssistError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request body for one chat round
    fn build_request(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        request: &str,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(request));

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        request: &str,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_request(system_prompt, history, request);
        debug!(model = %self.model, messages = body.messages.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::GenerationFailure(format!("Failed to reach Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistError::GenerationFailure(format!(
                "Ollama returned HTTP {}: {}",
                status, error_text
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistError::GenerationFailure(format!("Malformed chat response: {}", e)))?;

        Ok(reply.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama chat request
#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
