//! Record types persisted by the learning stores

use crate::learning::similarity::normalize;
use serde::{Deserialize, Serialize};

/// One (request, context, command) triple with its execution statistics.
///
/// Reliability is derived from the counters and never persisted, so it
/// cannot drift from `success_count > failure_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request as typed by the user
    pub user_request: String,

    /// Shell command associated with the request
    pub command: String,

    /// Last mutation time (ISO-8601 UTC)
    #[serde(default)]
    pub timestamp: String,

    /// Fingerprint of the environment the command ran in
    #[serde(default)]
    pub context_hash: String,

    /// Times this entry was used or reused
    #[serde(default)]
    pub usage_count: u32,

    /// Successful executions
    #[serde(default)]
    pub success_count: u32,

    /// Failed executions
    #[serde(default)]
    pub failure_count: u32,

    /// Most recent failure message, cleared on success
    #[serde(default)]
    pub last_error: String,
}

impl CacheEntry {
    /// Fresh entry for a triple that has just succeeded
    pub fn succeeded(
        user_request: &str,
        command: &str,
        context_hash: &str,
        timestamp: String,
    ) -> Self {
        Self {
            user_request: user_request.to_string(),
            command: command.to_string(),
            timestamp,
            context_hash: context_hash.to_string(),
            usage_count: 1,
            success_count: 1,
            failure_count: 0,
            last_error: String::new(),
        }
    }

    /// Fresh entry for a triple that has just failed
    pub fn failed(
        user_request: &str,
        command: &str,
        context_hash: &str,
        error_msg: &str,
        timestamp: String,
    ) -> Self {
        Self {
            user_request: user_request.to_string(),
            command: command.to_string(),
            timestamp,
            context_hash: context_hash.to_string(),
            usage_count: 1,
            success_count: 0,
            failure_count: 1,
            last_error: error_msg.to_string(),
        }
    }

    /// Count one more successful execution
    pub fn record_success(&mut self, timestamp: String) {
        self.timestamp = timestamp;
        self.usage_count = self.usage_count.saturating_add(1);
        self.success_count = self.success_count.saturating_add(1);
        self.last_error.clear();
    }

    /// Count one more failed execution
    pub fn record_failure(&mut self, error_msg: &str, timestamp: String) {
        self.timestamp = timestamp;
        self.usage_count = self.usage_count.saturating_add(1);
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_error = error_msg.to_string();
    }

    /// Count one more use without an outcome
    pub fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
    }

    /// True when successes outnumber failures
    pub fn is_reliable(&self) -> bool {
        self.success_count > self.failure_count
    }

    /// Identity key used for upserts and deduplication
    pub fn identity_key(&self) -> (String, String, String) {
        (
            normalize(&self.user_request),
            self.context_hash.clone(),
            self.command.clone(),
        )
    }

    /// Whether this entry is the triple identified by the arguments.
    /// `normalized_request` must already be normalized.
    pub fn matches(&self, normalized_request: &str, context_hash: &str, command: &str) -> bool {
        self.context_hash == context_hash
            && self.command == command
            && normalize(&self.user_request) == normalized_request
    }

    /// Records without a request or a command carry no signal
    pub fn is_valid(&self) -> bool {
        !self.user_request.trim().is_empty() && !self.command.trim().is_empty()
    }
}

/// Outcome classification stored with memory records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    #[default]
    Fail,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Fail => "fail",
        }
    }
}

/// One diagnosed execution in the failure log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Log time (ISO-8601 UTC); filled on append when empty
    #[serde(rename = "ts", default)]
    pub timestamp: String,

    /// Originating request
    #[serde(default)]
    pub user_request: String,

    /// Command that was executed
    #[serde(rename = "cmd")]
    pub command: String,

    /// Working directory at execution time
    #[serde(default)]
    pub cwd: String,

    /// Process exit status
    #[serde(default)]
    pub exit_code: i32,

    /// Outcome classification
    #[serde(default)]
    pub status: ExecutionStatus,

    /// Short diagnostic key
    #[serde(default)]
    pub error_signature: String,

    /// Causal explanation
    #[serde(default)]
    pub summary: String,

    /// Suggested alternative command or action
    #[serde(default)]
    pub fix: String,
}

/// Entry counts before and after a curation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeReport {
    pub before: usize,
    pub after: usize,
}

impl OptimizeReport {
    /// Number of records dropped by the pass
    pub fn removed(&self) -> usize {
        self.before.saturating_sub(self.after)
    }
}
