//! Shared fakes for integration tests
#![allow(dead_code)]

use aishell::conversation::{parse_transcript, ConversationStore, Turn};
use aishell::errors::{AssistError, Result};
use aishell::executor::{ExecutionOutput, Executor};
use aishell::generator::{ChatMessage, Generator};
use aishell::learning::{CommandCache, FailureMemory};
use aishell::orchestrator::{OrchestratorConfig, RetryOrchestrator};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CONTEXT_H1: &str = "Operating System: Windows 11\nShell: PowerShell";
pub const CONTEXT_H2: &str = "Operating System: Ubuntu 24.04\nShell: bash";
pub const SYSTEM_PROMPT: &str = "You translate requests into commands.";

/// One recorded `generate` call
#[derive(Debug, Clone)]
pub struct GeneratorCall {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub request: String,
}

/// Generator answering from a script, in order
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<GeneratorCall>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: &[&str]) -> Self {
        let generator = Self::default();
        for reply in replies {
            generator.push(reply);
        }
        generator
    }

    pub fn push(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_error(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(AssistError::GenerationFailure(message.to_string())));
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        request: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(GeneratorCall {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            request: request.to_string(),
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistError::GenerationFailure("script exhausted".to_string())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Executor with canned outputs per command
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    outputs: Arc<Mutex<HashMap<String, ExecutionOutput>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(command.to_string(), ExecutionOutput::new(exit_code, stdout, stderr));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionOutput> {
        self.executed.lock().unwrap().push(command.to_string());

        let output = self
            .outputs
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| {
                ExecutionOutput::new(127, "", format!("{}: command not found", command))
            });
        Ok(output)
    }
}

/// In-memory conversation store shared with the test
#[derive(Clone, Default)]
pub struct SharedConversation {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl SharedConversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }

    pub fn transcript(&self) -> String {
        self.turns()
            .iter()
            .map(|turn| format!("{} ||| ", turn))
            .collect()
    }
}

impl ConversationStore for SharedConversation {
    fn append(&mut self, turn: &Turn) -> Result<()> {
        self.turns.lock().unwrap().push(turn.clone());
        Ok(())
    }

    fn history(&self, max_exchanges: usize) -> Vec<ChatMessage> {
        parse_transcript(&self.transcript(), max_exchanges)
    }
}

/// Handles kept by a test after the orchestrator takes ownership
pub struct Harness {
    pub orchestrator: RetryOrchestrator,
    pub generator: ScriptedGenerator,
    pub executor: ScriptedExecutor,
    pub conversation: SharedConversation,
}

pub fn harness(
    dir: &Path,
    generator: ScriptedGenerator,
    executor: ScriptedExecutor,
    config: OrchestratorConfig,
) -> Harness {
    let conversation = SharedConversation::new();
    let orchestrator = RetryOrchestrator::new(
        CommandCache::open(dir.join("command_cache.jsonl")),
        FailureMemory::open(dir.join("terminal_memory.jsonl")),
        Box::new(generator.clone()),
        Box::new(executor.clone()),
        Box::new(conversation.clone()),
        config,
    );

    Harness {
        orchestrator,
        generator,
        executor,
        conversation,
    }
}

pub fn default_config() -> OrchestratorConfig {
    OrchestratorConfig::new(CONTEXT_H1, SYSTEM_PROMPT)
}

/// Diagnosis reply as a model would phrase it
pub fn diagnosis_reply(status: &str, signature: &str, summary: &str, fix: &str) -> String {
    format!(
        "Analysis follows.\n{{\"status\": \"{}\", \"error_signature\": \"{}\", \"summary\": \"{}\", \"fix\": \"{}\"}}",
        status, signature, summary, fix
    )
}
