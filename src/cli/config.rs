//! Configuration management for aishell
//!
//! TOML configuration with defaults and validation.
//! Location: ~/.aishell/config.toml

use crate::errors::{AssistError, Result};
use crate::orchestrator::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cache store file name inside the state directory
pub const CACHE_FILE: &str = "command_cache.jsonl";

/// Failure memory file name inside the state directory
pub const MEMORY_FILE: &str = "terminal_memory.jsonl";

/// Session context file name inside the state directory
pub const CONTEXT_FILE: &str = "context.json";

/// Optional prompt template inside the state directory
pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";

/// Upper bound for replayed history
pub const MAX_HISTORY_EXCHANGES: usize = 50;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub execution: ExecutionConfig,
    pub history: HistoryConfig,
    pub paths: PathsConfig,
}

/// Ollama connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub default_model: String,
    pub request_timeout_sec: u64,
}

/// Command execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_sec: u64,
    pub failure_policy: FailurePolicy,
    /// Ask before running a command
    pub confirm: bool,
}

/// Conversation history configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_exchanges: usize,
}

/// File system paths configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: String,
    /// Prompt template path; empty means `state_dir/system_prompt.txt`
    pub system_prompt: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            default_model: "qwen2.5:7b-instruct".to_string(),
            request_timeout_sec: 120,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 300,
            failure_policy: FailurePolicy::ExitCode,
            confirm: true,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_exchanges: 5 }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: "~/.aishell".to_string(),
            system_prompt: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AssistError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| AssistError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `~/.aishell/config.toml` if present, else built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".aishell").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.ollama.port == 0 {
            return Err(AssistError::ConfigError(
                "ollama.port must be greater than 0".to_string(),
            ));
        }

        if self.ollama.request_timeout_sec == 0 {
            return Err(AssistError::ConfigError(
                "ollama.request_timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.execution.timeout_sec == 0 {
            return Err(AssistError::ConfigError(
                "execution.timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.history.max_exchanges > MAX_HISTORY_EXCHANGES {
            return Err(AssistError::ConfigError(format!(
                "history.max_exchanges must be at most {}",
                MAX_HISTORY_EXCHANGES
            )));
        }

        if self.paths.state_dir.trim().is_empty() {
            return Err(AssistError::ConfigError(
                "paths.state_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AssistError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.request_timeout_sec)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_sec)
    }

    /// Expand a leading `~/` to the home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get state directory path
    pub fn state_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.state_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_dir().join(CACHE_FILE)
    }

    pub fn memory_path(&self) -> PathBuf {
        self.state_dir().join(MEMORY_FILE)
    }

    pub fn context_path(&self) -> PathBuf {
        self.state_dir().join(CONTEXT_FILE)
    }

    /// Prompt template candidates, most specific first
    pub fn system_prompt_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if !self.paths.system_prompt.trim().is_empty() {
            paths.push(Self::expand_path(self.paths.system_prompt.trim()));
        }
        paths.push(self.state_dir().join(SYSTEM_PROMPT_FILE));
        paths
    }
}
