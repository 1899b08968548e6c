//! `context.json` persistence
//!
//! Holds the model chosen at setup, the detected environment and the
//! running transcript.

use crate::conversation::{ConversationStore, Turn, SEGMENT_SEPARATOR};
use crate::environment::EnvironmentContext;
use crate::errors::Result;
use crate::generator::ChatMessage;
use crate::learning::store::write_lines_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Operating mode recorded by setup
pub const DEFAULT_OPERATING_MODE: &str = "Translator";

/// Persisted session context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default = "default_operating_mode")]
    pub operating_mode: String,
    #[serde(default)]
    pub model_name: String,
    pub environment: EnvironmentContext,
    #[serde(default)]
    pub transcript: String,
}

fn default_operating_mode() -> String {
    DEFAULT_OPERATING_MODE.to_string()
}

impl SessionContext {
    pub fn new(model_name: impl Into<String>, environment: EnvironmentContext) -> Self {
        Self {
            operating_mode: default_operating_mode(),
            model_name: model_name.into(),
            environment,
            transcript: String::new(),
        }
    }
}

/// Split a transcript into user/assistant messages.
///
/// Segments are separated by `|||`; `USER: ` and `ASSISTANT: ` segments
/// become messages, anything else (such as results) is skipped. Only the
/// last `max_exchanges` user turns and their replies are kept.
pub fn parse_transcript(transcript: &str, max_exchanges: usize) -> Vec<ChatMessage> {
    let mut exchanges: Vec<Vec<ChatMessage>> = Vec::new();

    for segment in transcript.split(SEGMENT_SEPARATOR).map(str::trim) {
        if let Some(request) = segment.strip_prefix("USER: ") {
            exchanges.push(vec![ChatMessage::user(request)]);
        } else if let Some(command) = segment.strip_prefix("ASSISTANT: ") {
            match exchanges.last_mut() {
                Some(exchange) => exchange.push(ChatMessage::assistant(command)),
                None => exchanges.push(vec![ChatMessage::assistant(command)]),
            }
        }
    }

    let skip = exchanges.len().saturating_sub(max_exchanges);
    exchanges.into_iter().skip(skip).flatten().collect()
}

/// Conversation store backed by `context.json`
#[derive(Debug, Clone)]
pub struct JsonConversationStore {
    path: PathBuf,
    context: SessionContext,
}

impl JsonConversationStore {
    /// Open the store at `path`.
    ///
    /// A missing or unreadable file yields a fresh context for the detected
    /// environment.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let context = Self::load(&path)
            .unwrap_or_else(|| SessionContext::new("", EnvironmentContext::detect()));
        Self { path, context }
    }

    /// Create a store with an explicit context, replacing whatever is on disk
    pub fn create(path: impl Into<PathBuf>, context: SessionContext) -> Result<Self> {
        let store = Self {
            path: path.into(),
            context,
        };
        store.save()?;
        Ok(store)
    }

    /// Read `context.json`, if present and well-formed
    pub fn load(path: &Path) -> Option<SessionContext> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read session context");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(context) => Some(context),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed session context");
                None
            }
        }
    }

    /// Whether setup has written a context file
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Persist the context atomically
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.context)?;
        write_lines_atomic(&self.path, [json])
    }

    /// Drop the transcript
    pub fn clear_history(&mut self) -> Result<()> {
        self.context.transcript.clear();
        self.save()
    }
}

impl ConversationStore for JsonConversationStore {
    fn append(&mut self, turn: &Turn) -> Result<()> {
        self.context.transcript.push_str(&turn.to_string());
        self.context.transcript.push(' ');
        self.context.transcript.push_str(SEGMENT_SEPARATOR);
        self.context.transcript.push(' ');
        self.save()
    }

    fn history(&self, max_exchanges: usize) -> Vec<ChatMessage> {
        parse_transcript(&self.context.transcript, max_exchanges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Role;
    use tempfile::TempDir;

    fn env() -> EnvironmentContext {
        EnvironmentContext::new("Linux", "bash", "tester")
    }

    #[test]
    fn test_parse_transcript_pairs() {
        let transcript = "USER: list files ||| ASSISTANT: ls ||| RESULT: [SUCCESS] ||| \
                          USER: disk usage ||| ASSISTANT: df -h ||| RESULT: [SUCCESS] ||| ";
        let messages = parse_transcript(transcript, 5);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::user("list files"));
        assert_eq!(messages[1], ChatMessage::assistant("ls"));
        assert_eq!(messages[3], ChatMessage::assistant("df -h"));
    }

    #[test]
    fn test_parse_transcript_limits_exchanges() {
        let transcript: String = (0..8)
            .map(|i| format!("USER: r{} ||| ASSISTANT: c{} ||| RESULT: [SUCCESS] ||| ", i, i))
            .collect();
        let messages = parse_transcript(&transcript, 5);

        assert_eq!(messages.len(), 10);
        assert_eq!(messages[0], ChatMessage::user("r3"));
        assert_eq!(messages[9], ChatMessage::assistant("c7"));
    }

    #[test]
    fn test_parse_transcript_zero_and_empty() {
        assert!(parse_transcript("USER: a ||| ASSISTANT: b ||| ", 0).is_empty());
        assert!(parse_transcript("", 5).is_empty());
    }

    #[test]
    fn test_open_missing_file_gives_fresh_context() {
        let dir = TempDir::new().unwrap();
        let store = JsonConversationStore::open(dir.path().join("context.json"));

        assert!(!store.exists());
        assert_eq!(store.context().operating_mode, DEFAULT_OPERATING_MODE);
        assert!(store.history(5).is_empty());
    }

    #[test]
    fn test_append_persists_and_replays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.json");
        let mut store =
            JsonConversationStore::create(&path, SessionContext::new("llama3.1:8b", env())).unwrap();

        store.append(&Turn::success("list files", "ls")).unwrap();
        store
            .append(&Turn::failed("open report", "cat report.txt", 1, "No such file"))
            .unwrap();

        let reopened = JsonConversationStore::open(&path);
        assert_eq!(reopened.context().model_name, "llama3.1:8b");
        assert_eq!(
            reopened.context().transcript,
            "USER: list files ||| ASSISTANT: ls ||| RESULT: [SUCCESS] ||| \
             USER: open report ||| ASSISTANT: cat report.txt ||| RESULT: [FAILED: exit=1 error=No such file] ||| "
        );

        let history = reopened.history(5);
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].content, "open report");
    }

    #[test]
    fn test_clear_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.json");
        let mut store = JsonConversationStore::create(&path, SessionContext::new("m", env())).unwrap();
        store.append(&Turn::success("a", "b")).unwrap();

        store.clear_history().unwrap();

        let reopened = JsonConversationStore::open(&path);
        assert!(reopened.context().transcript.is_empty());
        assert_eq!(reopened.context().model_name, "m");
    }

    #[test]
    fn test_malformed_context_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(JsonConversationStore::load(&path).is_none());
        let store = JsonConversationStore::open(&path);
        assert!(store.context().transcript.is_empty());
    }
}
