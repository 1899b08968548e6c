//! Retry orchestrator
//!
//! Ties the command cache, the failure memory and the collaborators into one
//! feedback loop: look up or generate a command, run it, classify the
//! outcome, record it, and on failure try one generated alternative.
//!
//! Store errors never abort a run. They are logged and the run goes on with
//! the in-memory view; only generation failures surface as errors.

use crate::conversation::{ConversationStore, Turn};
use crate::errors::{AssistError, Result};
use crate::executor::{sanitize_command, ExecutionOutput, Executor};
use crate::generator::{clean_command, Diagnosis, Generator};
use crate::learning::{CommandCache, ExecutionStatus, FailureMemory, MemoryEntry};
use crate::orchestrator::classify::{classify, Classification, FailurePolicy};
use crate::orchestrator::events::RunEvent;
use crate::orchestrator::prompts;
use crate::orchestrator::state::{RetryEvent, RetryState};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Default number of past exchanges replayed to the generator
pub const DEFAULT_MAX_HISTORY_EXCHANGES: usize = 5;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Environment descriptor hashed into cache keys
    pub context: String,

    /// Rendered system prompt for command generation
    pub system_prompt: String,

    /// When an execution counts as failed
    pub failure_policy: FailurePolicy,

    /// Past exchanges replayed to the generator
    pub max_history_exchanges: usize,

    /// Recorded with failure memory entries
    pub working_dir: PathBuf,
}

impl OrchestratorConfig {
    pub fn new(context: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            system_prompt: system_prompt.into(),
            failure_policy: FailurePolicy::default(),
            max_history_exchanges: DEFAULT_MAX_HISTORY_EXCHANGES,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// A command chosen for a request, not yet executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub request: String,
    pub command: String,
    pub from_cache: bool,
}

/// One execution of one command
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub command: String,
    pub output: ExecutionOutput,
    pub classification: Classification,
}

/// What happened to a request
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub request: String,
    pub from_cache: bool,
    /// One or two attempts, in execution order
    pub attempts: Vec<Attempt>,
    /// Verdict recorded for a failed run or a triaged success
    pub diagnosis: Option<Diagnosis>,
    /// Terminal state
    pub state: RetryState,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RetryState::Succeeded
    }

    pub fn retried(&self) -> bool {
        self.attempts.len() > 1
    }

    /// The last attempt
    pub fn final_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// The command the run ended with
    pub fn final_command(&self) -> &str {
        self.final_attempt().map(|a| a.command.as_str()).unwrap_or_default()
    }
}

/// Drives one request through lookup, execution and at most one retry
pub struct RetryOrchestrator {
    cache: CommandCache,
    memory: FailureMemory,
    generator: Box<dyn Generator>,
    executor: Box<dyn Executor>,
    conversation: Box<dyn ConversationStore>,
    config: OrchestratorConfig,
}

impl RetryOrchestrator {
    pub fn new(
        cache: CommandCache,
        memory: FailureMemory,
        generator: Box<dyn Generator>,
        executor: Box<dyn Executor>,
        conversation: Box<dyn ConversationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cache,
            memory,
            generator,
            executor,
            conversation,
            config,
        }
    }

    pub fn cache(&self) -> &CommandCache {
        &self.cache
    }

    pub fn memory(&self) -> &FailureMemory {
        &self.memory
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Prepare, execute and record `request` in one go
    pub async fn handle(&mut self, request: &str) -> Result<RunReport> {
        let prepared = self.prepare(request).await?;
        self.execute(prepared).await
    }

    /// Choose a command for `request`: a cached one, else a generated one.
    ///
    /// Nothing is recorded; a prepared command that is never executed
    /// leaves no trace.
    pub async fn prepare(&mut self, request: &str) -> Result<PreparedCommand> {
        let mut state = RetryState::Lookup;

        if let Some(command) = self.cache.find_cached_command(request, &self.config.context) {
            state = advance(state, RetryEvent::CacheHit)?;
            advance(state, RetryEvent::CommandReady)?;
            info!(%command, "cache hit");
            return Ok(PreparedCommand {
                request: request.to_string(),
                command,
                from_cache: true,
            });
        }

        state = advance(state, RetryEvent::CacheMiss)?;

        let memory_digest = self.memory.retrieve_relevant_context(request, "");
        let cache_digest = self.cache.get_similar_commands(request);
        let system_prompt = prompts::build_generation_prompt(
            &self.config.system_prompt,
            memory_digest.as_deref(),
            cache_digest.as_deref(),
        );
        let history = self.conversation.history(self.config.max_history_exchanges);

        let reply = self
            .generator
            .generate(&system_prompt, &history, request)
            .await?;
        let command = sanitize_command(&clean_command(&reply));
        if command.is_empty() {
            return Err(AssistError::GenerationFailure(
                "model returned an empty command".to_string(),
            ));
        }

        advance(state, RetryEvent::CommandReady)?;
        Ok(PreparedCommand {
            request: request.to_string(),
            command,
            from_cache: false,
        })
    }

    /// Execute a prepared command and record the outcome
    pub async fn execute(&mut self, prepared: PreparedCommand) -> Result<RunReport> {
        self.execute_observed(prepared, &mut |_: &RunEvent| {}).await
    }

    /// Like [`execute`](Self::execute), reporting progress to `observer`
    pub async fn execute_observed(
        &mut self,
        prepared: PreparedCommand,
        observer: &mut (dyn FnMut(&RunEvent) + Send),
    ) -> Result<RunReport> {
        let PreparedCommand {
            request,
            command,
            from_cache,
        } = prepared;
        // Cache and conversation record exactly what the executor runs
        let command = sanitize_command(&command);

        let mut state = RetryState::Execute;
        let mut report = RunReport {
            request: request.clone(),
            from_cache,
            attempts: Vec::with_capacity(2),
            diagnosis: None,
            state,
        };

        let first = self.run_attempt(&command, 1, observer).await;
        let first_failed = first.classification.is_failure();
        report.attempts.push(first);

        if !first_failed {
            state = advance(state, RetryEvent::ExecutionSucceeded)?;
            if from_cache {
                self.record_cached_success(&request);
            } else {
                self.record_success(&request, &command);
            }
            self.triage_stderr(&request, &mut report, observer).await;
            return Ok(self.finish(report, state));
        }

        state = advance(state, RetryEvent::ExecutionFailed)?;
        let first_error = report.attempts[0].output.error_text();
        self.record_failure(&request, &command, &first_error);

        observer(&RunEvent::SeekingAlternative);
        let alternative = self.generate_alternative(&request, &command, &first_error).await;

        let Some(alternative) = alternative else {
            observer(&RunEvent::NoAlternative);
            state = advance(state, RetryEvent::NoAlternative)?;
            self.diagnose_failure(&request, &mut report, observer).await;
            return Ok(self.finish(report, state));
        };

        state = advance(state, RetryEvent::AlternativeReady)?;
        let second = self.run_attempt(&alternative, 2, observer).await;
        let second_failed = second.classification.is_failure();
        report.attempts.push(second);

        if second_failed {
            state = advance(state, RetryEvent::ExecutionFailed)?;
            let second_error = report.attempts[1].output.error_text();
            self.record_failure(&request, &alternative, &second_error);
            self.diagnose_failure(&request, &mut report, observer).await;
        } else {
            state = advance(state, RetryEvent::ExecutionSucceeded)?;
            self.record_success(&request, &alternative);
            self.triage_stderr(&request, &mut report, observer).await;
        }

        Ok(self.finish(report, state))
    }

    async fn run_attempt(
        &self,
        command: &str,
        attempt: usize,
        observer: &mut (dyn FnMut(&RunEvent) + Send),
    ) -> Attempt {
        observer(&RunEvent::Executing {
            command: command.to_string(),
            attempt,
        });

        let output = match self.executor.execute(command).await {
            Ok(output) => output,
            Err(e) => ExecutionOutput::not_run(e.to_string()),
        };
        let classification = classify(self.config.failure_policy, &output);
        debug!(%command, exit_code = output.exit_code, ?classification, "attempt finished");

        observer(&RunEvent::Executed {
            command: command.to_string(),
            output: output.clone(),
            classification,
        });

        Attempt {
            command: command.to_string(),
            output,
            classification,
        }
    }

    /// Ask for a command different from `failed_command`
    async fn generate_alternative(
        &self,
        request: &str,
        failed_command: &str,
        error: &str,
    ) -> Option<String> {
        let prompt = prompts::fix_prompt(request, failed_command, error);
        let reply = match self
            .generator
            .generate(&self.config.system_prompt, &[], &prompt)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "could not generate an alternative command");
                return None;
            }
        };

        let alternative = sanitize_command(&clean_command(&reply));
        if alternative.is_empty() || alternative == failed_command {
            debug!(%alternative, "generated alternative is unusable");
            return None;
        }

        info!(%alternative, "retrying with alternative");
        Some(alternative)
    }

    /// Verdict about `attempt`, from the generator or derived from stderr
    async fn diagnose(&self, request: &str, attempt: &Attempt) -> Diagnosis {
        let prompt = prompts::diagnosis_prompt(
            request,
            &attempt.command,
            attempt.output.exit_code,
            &attempt.output.stderr,
        );

        match self
            .generator
            .generate(prompts::ANALYZER_SYSTEM_PROMPT, &[], &prompt)
            .await
        {
            Ok(reply) => Diagnosis::parse(&reply).unwrap_or_else(|| {
                warn!("diagnosis reply was not valid JSON, using fallback");
                Diagnosis::fallback(&attempt.output.stderr, attempt.output.exit_code)
            }),
            Err(e) => {
                warn!(error = %e, "diagnosis unavailable, using fallback");
                Diagnosis::fallback(&attempt.output.stderr, attempt.output.exit_code)
            }
        }
    }

    /// Diagnose the final failed attempt and write it to failure memory
    async fn diagnose_failure(
        &self,
        request: &str,
        report: &mut RunReport,
        observer: &mut (dyn FnMut(&RunEvent) + Send),
    ) {
        let Some(attempt) = report.final_attempt() else {
            return;
        };

        observer(&RunEvent::Diagnosing);
        let mut diagnosis = self.diagnose(request, attempt).await;
        // The run failed regardless of what the analyzer thinks
        diagnosis.status = ExecutionStatus::Fail;

        self.remember(request, attempt, &diagnosis);
        report.diagnosis = Some(diagnosis);
    }

    /// A successful attempt that wrote to stderr is diagnosed; only a
    /// `fail` verdict is remembered.
    async fn triage_stderr(
        &self,
        request: &str,
        report: &mut RunReport,
        observer: &mut (dyn FnMut(&RunEvent) + Send),
    ) {
        let Some(attempt) = report.final_attempt() else {
            return;
        };
        if attempt.classification != Classification::SuccessWithStderr {
            return;
        }

        observer(&RunEvent::Diagnosing);
        let diagnosis = self.diagnose(request, attempt).await;
        if diagnosis.is_failure() {
            self.remember(request, attempt, &diagnosis);
        }
        report.diagnosis = Some(diagnosis);
    }

    fn remember(&self, request: &str, attempt: &Attempt, diagnosis: &Diagnosis) {
        let entry = MemoryEntry {
            timestamp: String::new(),
            user_request: request.to_string(),
            command: attempt.command.clone(),
            cwd: self.config.working_dir.display().to_string(),
            exit_code: attempt.output.exit_code,
            status: diagnosis.status,
            error_signature: diagnosis.error_signature.clone(),
            summary: diagnosis.summary.clone(),
            fix: diagnosis.fix.clone(),
        };

        if let Err(e) = self.memory.log_execution(&entry) {
            warn!(error = %e, "failed to write failure memory");
        }
    }

    fn record_success(&mut self, request: &str, command: &str) {
        if let Err(e) = self
            .cache
            .cache_command(request, command, &self.config.context)
        {
            warn!(error = %e, "failed to persist command cache");
        }
    }

    fn record_cached_success(&mut self, request: &str) {
        if let Err(e) = self.cache.increment_usage(request) {
            warn!(error = %e, "failed to persist command cache");
        }
    }

    fn record_failure(&mut self, request: &str, command: &str, error: &str) {
        if let Err(e) =
            self.cache
                .mark_command_failed(request, command, error, &self.config.context)
        {
            warn!(error = %e, "failed to persist command cache");
        }
    }

    /// Append the conversation turn and seal the report
    fn finish(&mut self, mut report: RunReport, state: RetryState) -> RunReport {
        report.state = state;

        let succeeded = report.succeeded();
        let turn = report.final_attempt().map(|attempt| {
            if succeeded {
                Turn::success(report.request.clone(), attempt.command.clone())
            } else {
                Turn::failed(
                    report.request.clone(),
                    attempt.command.clone(),
                    attempt.output.exit_code,
                    attempt.output.error_text(),
                )
            }
        });

        if let Some(turn) = turn {
            if let Err(e) = self.conversation.append(&turn) {
                warn!(error = %e, "failed to record conversation turn");
            }
        }

        info!(state = ?report.state, attempts = report.attempts.len(), "request finished");
        report
    }
}

/// Apply `event`, logging the transition
fn advance(state: RetryState, event: RetryEvent) -> Result<RetryState> {
    let next = state.transition(event)?;
    debug!(from = ?state, ?event, to = ?next, "retry state transition");
    Ok(next)
}
