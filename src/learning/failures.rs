//! Failure Memory: append-only log of diagnosed executions
//!
//! Retrieval is plain substring containment over the raw lines, newest first.

use crate::errors::Result;
use crate::learning::now_timestamp;
use crate::learning::store;
use crate::learning::types::{MemoryEntry, OptimizeReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum distinct fixes rendered by `retrieve_relevant_context`
pub const MAX_FIXES: usize = 2;

/// Persistent failure log
#[derive(Debug, Clone)]
pub struct FailureMemory {
    path: PathBuf,
}

impl FailureMemory {
    /// Handle on the log stored at `path`; nothing is read until needed
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Existing lines are never touched.
    pub fn log_execution(&self, entry: &MemoryEntry) -> Result<()> {
        let line = if entry.timestamp.is_empty() {
            let mut stamped = entry.clone();
            stamped.timestamp = now_timestamp();
            store::to_line(&stamped)?
        } else {
            store::to_line(entry)?
        };

        store::append_line(&self.path, &line)?;
        debug!(command = %entry.command, signature = %entry.error_signature, "failure logged");
        Ok(())
    }

    /// All parseable records, oldest first
    pub fn entries(&self) -> Vec<MemoryEntry> {
        store::read_records(&self.path)
    }

    /// Warning block of past failed commands and their fixes.
    ///
    /// A line is relevant when it contains `query` or `error_signature`
    /// (empty needles never match). Lines are visited newest first, records
    /// without a fix are skipped, identical fixes count once, and at most
    /// `MAX_FIXES` fixes are returned.
    pub fn retrieve_relevant_context(&self, query: &str, error_signature: &str) -> Option<String> {
        if query.is_empty() && error_signature.is_empty() {
            return None;
        }

        let query = json_escaped(query);
        let error_signature = json_escaped(error_signature);

        let lines = store::read_lines(&self.path);
        let mut seen_fixes = HashSet::new();
        let mut pairs: Vec<(String, String)> = Vec::new();

        for line in lines.iter().rev() {
            let relevant = (!query.is_empty() && line.contains(query.as_str()))
                || (!error_signature.is_empty() && line.contains(error_signature.as_str()));
            if !relevant {
                continue;
            }

            let Ok(entry) = serde_json::from_str::<MemoryEntry>(line) else {
                continue;
            };
            if entry.fix.trim().is_empty() {
                continue;
            }
            if !seen_fixes.insert(entry.fix.clone()) {
                continue;
            }

            pairs.push((entry.command, entry.fix));
            if pairs.len() >= MAX_FIXES {
                break;
            }
        }

        if pairs.is_empty() {
            return None;
        }

        let mut block = String::from("PAST FAILURES (from memory):\n");
        for (command, fix) in pairs {
            block.push_str(&format!("- Failed command: {}\n  Fix: {}\n", command, fix));
        }
        Some(block)
    }

    /// Remove exact duplicate lines, keeping first-seen order.
    ///
    /// Fails without touching the log when it cannot be read.
    pub fn optimize(&self) -> Result<OptimizeReport> {
        let lines = store::load_lines(&self.path)?;
        let before = lines.len();

        let mut seen = HashSet::new();
        let unique: Vec<&String> = lines.iter().filter(|line| seen.insert(*line)).collect();
        let after = unique.len();

        store::write_lines_atomic(&self.path, unique)?;
        debug!(before, after, "failure memory optimized");

        Ok(OptimizeReport { before, after })
    }
}

/// `text` as it appears inside a serialized JSON string
fn json_escaped(text: &str) -> String {
    let quoted = serde_json::Value::from(text).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
