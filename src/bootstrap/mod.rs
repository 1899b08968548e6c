//! Ollama reachability and model discovery
//!
//! Used by `setup` to offer installed models and by request runs to fail
//! fast with instructions when the server is down.

use crate::errors::{AssistError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Probe timeout; the server is local so this stays short
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code when setup or a running server is required
pub const EXIT_CODE_SETUP_NEEDED: i32 = 2;

/// An installed model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl InstalledModel {
    /// Size in gigabytes, for display
    pub fn size_gb(&self) -> f64 {
        self.size as f64 / 1_000_000_000.0
    }
}

/// Response of `GET /api/tags`
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

/// Result of a readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Ready,
    OllamaNotRunning,
    ModelNotAvailable(String),
}

/// Ollama server probe
pub struct Bootstrap {
    client: Client,
    base_url: String,
}

impl Bootstrap {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the API answers at all
    pub async fn check_ollama_running(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Installed models, in server order
    pub async fn list_models(&self) -> Result<Vec<InstalledModel>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AssistError::OllamaApiError(format!("Failed to query models: {}", e)))?;

        if !response.status().is_success() {
            return Err(AssistError::OllamaApiError(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AssistError::OllamaApiError(format!("Failed to parse response: {}", e)))?;

        Ok(tags.models)
    }

    /// Server up and `model` installed
    pub async fn check(&self, model: &str) -> Result<BootstrapStatus> {
        if !self.check_ollama_running().await {
            return Ok(BootstrapStatus::OllamaNotRunning);
        }

        let models = self.list_models().await?;
        if !has_model(&models, model) {
            return Ok(BootstrapStatus::ModelNotAvailable(model.to_string()));
        }

        Ok(BootstrapStatus::Ready)
    }
}

/// Whether `model` is installed; a bare name matches its `:latest` tag
pub fn has_model(models: &[InstalledModel], model: &str) -> bool {
    models.iter().any(|m| {
        m.name == model || (!model.contains(':') && m.name == format!("{}:latest", model))
    })
}

/// Instructions shown when the server is unreachable
pub fn ollama_install_hint() -> &'static str {
    "Ollama is required.\n\n\
     Install:\n  \
     Linux:   curl -fsSL https://ollama.com/install.sh | sh\n  \
     macOS:   brew install ollama\n  \
     Windows: https://ollama.com/download\n\n\
     Start it with:\n  \
     ollama serve"
}

/// Instructions shown when the configured model is missing
pub fn model_pull_hint(model: &str) -> String {
    format!(
        "Download it with:\n  ollama pull {}\n\nOr pick another installed model with:\n  ai setup",
        model
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> InstalledModel {
        InstalledModel {
            name: name.to_string(),
            size: 4_700_000_000,
            modified_at: String::new(),
        }
    }

    #[test]
    fn test_base_url_trimmed() {
        let bootstrap = Bootstrap::new("http://localhost:11434/");
        assert_eq!(bootstrap.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_tags_parsing() {
        let raw = r#"{"models":[{"name":"qwen2.5:7b-instruct","size":4683087332,"digest":"abc","modified_at":"2024-10-01T10:00:00Z"},{"name":"llama3.1:latest"}]}"#;
        let tags: TagsResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[0].name, "qwen2.5:7b-instruct");
        assert_eq!(tags.models[1].size, 0);
    }

    #[test]
    fn test_has_model() {
        let models = vec![model("qwen2.5:7b-instruct"), model("llama3.1:latest")];

        assert!(has_model(&models, "qwen2.5:7b-instruct"));
        assert!(has_model(&models, "llama3.1"));
        assert!(!has_model(&models, "qwen2.5"));
        assert!(!has_model(&[], "llama3.1"));
    }

    #[test]
    fn test_size_gb() {
        assert!((model("m").size_gb() - 4.7).abs() < 1e-9);
    }

    #[test]
    fn test_model_pull_hint() {
        assert!(model_pull_hint("mistral").contains("ollama pull mistral"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let bootstrap = Bootstrap::new("http://127.0.0.1:9");
        assert!(!bootstrap.check_ollama_running().await);
        assert_eq!(
            bootstrap.check("any").await.unwrap(),
            BootstrapStatus::OllamaNotRunning
        );
    }
}
