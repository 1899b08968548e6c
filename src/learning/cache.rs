//! Command Cache: reliability-weighted (request, context, command) store
//!
//! The whole store is loaded on open and kept as an ordered snapshot. Every
//! mutating call rewrites the file; if that write fails the error is returned
//! but the in-memory snapshot keeps the mutation for the rest of the run.
//! A file that exists but could not be read is never rewritten.

use crate::errors::{AssistError, Result};
use crate::learning::now_timestamp;
use crate::learning::similarity::{normalize, similarity};
use crate::learning::store;
use crate::learning::types::{CacheEntry, OptimizeReport};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Minimum similarity for a direct cache hit
pub const HIT_THRESHOLD: f64 = 0.8;

/// Minimum similarity for an entry to be shown as precedent
pub const PRECEDENT_THRESHOLD: f64 = 0.3;

/// Maximum entries rendered in a precedent digest
pub const PRECEDENT_LIMIT: usize = 3;

/// Unreliable entries used more often than this survive `optimize`
pub const RETAIN_USAGE_FLOOR: u32 = 3;

/// Hex characters kept from the context digest
const CONTEXT_HASH_LEN: usize = 16;

/// Stable fingerprint of an environment descriptor
pub fn context_hash(context: &str) -> String {
    let digest = Sha256::digest(context.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..CONTEXT_HASH_LEN].to_string()
}

/// Persistent command cache
#[derive(Debug)]
pub struct CommandCache {
    path: PathBuf,
    entries: Vec<CacheEntry>,
    /// Why the file could not be read on load, if it could not
    load_error: Option<(ErrorKind, String)>,
}

impl CommandCache {
    /// Open the cache stored at `path`, loading every valid record
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self {
            path: path.into(),
            entries: Vec::new(),
            load_error: None,
        };
        cache.reload();
        debug!(path = %cache.path.display(), entries = cache.entries.len(), "command cache loaded");
        cache
    }

    /// Discard the snapshot and reload from disk
    pub fn reload(&mut self) {
        match store::load_lines(&self.path) {
            Ok(lines) => {
                self.entries = store::parse_records::<CacheEntry>(&lines)
                    .into_iter()
                    .filter(CacheEntry::is_valid)
                    .collect();
                self.load_error = None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "command cache unreadable, it will not be rewritten");
                self.entries.clear();
                self.load_error = Some((e.kind(), e.to_string()));
            }
        }
    }

    /// Store file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in store order
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose successes outnumber their failures
    pub fn reliable_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_reliable()).count()
    }

    /// Whether the store file existed but could not be read
    pub fn is_unreadable(&self) -> bool {
        self.load_error.is_some()
    }

    fn save(&self) -> Result<()> {
        if let Some((kind, message)) = &self.load_error {
            let source = io::Error::new(
                *kind,
                format!("store could not be read ({}), refusing to overwrite it", message),
            );
            return Err(AssistError::store_write(&self.path, source));
        }
        store::write_records_atomic(&self.path, &self.entries)
    }

    fn position(&self, request: &str, command: &str, ctx_hash: &str) -> Option<usize> {
        let norm_request = normalize(request);
        self.entries
            .iter()
            .position(|e| e.matches(&norm_request, ctx_hash, command))
    }

    /// Best command for `request` in `context`, if one is similar enough.
    ///
    /// Only entries recorded under the same context are considered, and
    /// entries that have failed without ever becoming reliable are skipped.
    pub fn find_cached_command(&self, request: &str, context: &str) -> Option<String> {
        let ctx_hash = context_hash(context);

        let mut best_score = 0.0;
        let mut best: Option<&CacheEntry> = None;

        for entry in &self.entries {
            if entry.context_hash != ctx_hash {
                continue;
            }
            if !entry.is_reliable() && entry.failure_count > 0 {
                continue;
            }

            let score = similarity(request, &entry.user_request);
            if score > best_score {
                best_score = score;
                best = Some(entry);
            }
        }

        if best_score >= HIT_THRESHOLD {
            best.map(|e| e.command.clone())
        } else {
            None
        }
    }

    /// Record a successful execution of `command` for `request`
    pub fn cache_command(&mut self, request: &str, command: &str, context: &str) -> Result<()> {
        let ctx_hash = context_hash(context);
        let timestamp = now_timestamp();

        match self.position(request, command, &ctx_hash) {
            Some(idx) => {
                self.entries[idx].record_success(timestamp);
            }
            None => {
                self.entries
                    .push(CacheEntry::succeeded(request, command, &ctx_hash, timestamp));
            }
        }

        self.save()
    }

    /// Record a failed execution of `command` for `request`
    pub fn mark_command_failed(
        &mut self,
        request: &str,
        command: &str,
        error_msg: &str,
        context: &str,
    ) -> Result<()> {
        let ctx_hash = context_hash(context);
        let timestamp = now_timestamp();

        match self.position(request, command, &ctx_hash) {
            Some(idx) => {
                self.entries[idx].record_failure(error_msg, timestamp);
            }
            None => {
                self.entries.push(CacheEntry::failed(
                    request, command, &ctx_hash, error_msg, timestamp,
                ));
            }
        }

        self.save()
    }

    /// Bump the usage counter of the first entry for `request`.
    ///
    /// Context and command are ignored. Returns whether an entry was found;
    /// nothing is written when none was.
    pub fn increment_usage(&mut self, request: &str) -> Result<bool> {
        let norm_request = normalize(request);

        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| normalize(&e.user_request) == norm_request)
        else {
            return Ok(false);
        };
        entry.record_use();

        self.save()?;
        Ok(true)
    }

    fn ranked<'a>(
        &'a self,
        request: &str,
        filter: impl Fn(&CacheEntry) -> bool,
    ) -> Vec<(f64, &'a CacheEntry)> {
        let mut scored: Vec<(f64, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|e| filter(e))
            .map(|e| (similarity(request, &e.user_request), e))
            .filter(|(score, _)| *score > PRECEDENT_THRESHOLD)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(PRECEDENT_LIMIT);
        scored
    }

    /// Digest of the most similar cached commands, for prompt enrichment
    pub fn get_similar_commands(&self, request: &str) -> Option<String> {
        let scored = self.ranked(request, |_| true);
        if scored.is_empty() {
            return None;
        }

        let mut digest = String::from("CACHED COMMANDS (similar requests):\n");
        for (_, entry) in scored {
            digest.push_str(&format!(
                "- Request: \"{}\"\n  Command: {}\n  Success: {}, Failures: {}\n",
                entry.user_request, entry.command, entry.success_count, entry.failure_count
            ));
        }
        Some(digest)
    }

    /// Digest of the most similar reliable commands
    pub fn get_reliable_commands(&self, request: &str) -> Option<String> {
        let scored = self.ranked(request, CacheEntry::is_reliable);
        if scored.is_empty() {
            return None;
        }

        let mut digest = String::from("RELIABLE CACHED COMMANDS (proven to work):\n");
        for (_, entry) in scored {
            digest.push_str(&format!(
                "- Request: \"{}\"\n  Command: {}\n  Success: {}, Failures: {}\n",
                entry.user_request, entry.command, entry.success_count, entry.failure_count
            ));
        }
        Some(digest)
    }

    /// Drop unreliable, rarely used entries and duplicate triples.
    ///
    /// Unreliable entries with usage above the floor are kept as learning
    /// signal. Among duplicates the first occurrence wins. Idempotent.
    pub fn optimize(&mut self) -> Result<OptimizeReport> {
        let before = self.entries.len();

        let mut seen = HashSet::new();
        self.entries.retain(|entry| {
            let keep = entry.is_reliable() || entry.usage_count > RETAIN_USAGE_FLOOR;
            keep && seen.insert(entry.identity_key())
        });

        let report = OptimizeReport {
            before,
            after: self.entries.len(),
        };
        debug!(before = report.before, after = report.after, "command cache optimized");

        self.save()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> CommandCache {
        CommandCache::open(dir.path().join("command_cache.jsonl"))
    }

    #[test]
    fn test_context_hash_is_stable() {
        assert_eq!(context_hash("linux/bash"), context_hash("linux/bash"));
        assert_ne!(context_hash("linux/bash"), context_hash("windows/cmd"));
        assert_eq!(context_hash("x").len(), 16);
    }

    #[test]
    fn test_cache_command_inserts_then_updates() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);

        cache.cache_command("list files", "ls", "ctx").unwrap();
        cache.cache_command("  List FILES ", "ls", "ctx").unwrap();

        assert_eq!(cache.len(), 1);
        let entry = &cache.entries()[0];
        assert_eq!(entry.user_request, "list files");
        assert_eq!(entry.usage_count, 2);
        assert_eq!(entry.success_count, 2);
        assert!(entry.is_reliable());
    }

    #[test]
    fn test_competing_commands_tracked_separately() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);

        cache.cache_command("list files", "ls", "ctx").unwrap();
        cache.cache_command("list files", "ls -la", "ctx").unwrap();
        cache.cache_command("list files", "ls", "other").unwrap();

        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_mark_failed_then_succeed_clears_error() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);

        cache
            .mark_command_failed("open report", "cat report", "No such file", "ctx")
            .unwrap();
        {
            let entry = &cache.entries()[0];
            assert_eq!(entry.failure_count, 1);
            assert_eq!(entry.success_count, 0);
            assert_eq!(entry.last_error, "No such file");
            assert!(!entry.is_reliable());
        }

        cache.cache_command("open report", "cat report", "ctx").unwrap();
        cache.cache_command("open report", "cat report", "ctx").unwrap();
        let entry = &cache.entries()[0];
        assert_eq!(entry.usage_count, 3);
        assert!(entry.last_error.is_empty());
        assert!(entry.is_reliable());
    }

    #[test]
    fn test_find_requires_matching_context() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.cache_command("list files", "ls", "ctx-a").unwrap();

        assert_eq!(cache.find_cached_command("list files", "ctx-a").as_deref(), Some("ls"));
        assert!(cache.find_cached_command("list files", "ctx-b").is_none());
    }

    #[test]
    fn test_find_respects_threshold() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.cache_command("show disk usage", "df -h", "ctx").unwrap();

        // Same verb, 2/3 words shared: 0.4 + 0.6 * 0.5 = 0.7
        assert!(cache.find_cached_command("show disk space", "ctx").is_none());
        // Same verb, 3/4 words shared: 0.4 + 0.6 * 0.75 = 0.85
        assert_eq!(
            cache.find_cached_command("show disk usage now", "ctx").as_deref(),
            Some("df -h")
        );
    }

    #[test]
    fn test_find_skips_failed_unreliable_entries() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache
            .mark_command_failed("list files", "dir /w", "bad flag", "ctx")
            .unwrap();

        assert!(cache.find_cached_command("list files", "ctx").is_none());
    }

    #[test]
    fn test_find_prefers_first_of_equal_scores() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.cache_command("list files", "ls", "ctx").unwrap();
        cache.cache_command("list files", "ls -1", "ctx").unwrap();

        assert_eq!(cache.find_cached_command("list files", "ctx").as_deref(), Some("ls"));
    }

    #[test]
    fn test_increment_usage_touches_first_match_only() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.cache_command("list files", "ls", "ctx-a").unwrap();
        cache.cache_command("list files", "dir", "ctx-b").unwrap();

        assert!(cache.increment_usage("LIST files").unwrap());
        assert_eq!(cache.entries()[0].usage_count, 2);
        assert_eq!(cache.entries()[0].success_count, 1);
        assert_eq!(cache.entries()[1].usage_count, 1);

        assert!(!cache.increment_usage("unknown request").unwrap());
    }

    #[test]
    fn test_similar_commands_digest() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.cache_command("list files", "ls", "ctx").unwrap();
        cache.cache_command("list hidden files", "ls -a", "ctx").unwrap();
        cache.cache_command("compress logs", "tar czf logs.tgz logs", "ctx").unwrap();

        let digest = cache.get_similar_commands("list files").unwrap();
        assert!(digest.contains("Command: ls\n"));
        assert!(digest.contains("Command: ls -a"));
        assert!(!digest.contains("tar czf"));
        // Exact match ranks first
        assert!(digest.find("Command: ls\n").unwrap() < digest.find("Command: ls -a").unwrap());

        assert!(cache.get_similar_commands("reboot now").is_none());
    }

    #[test]
    fn test_similar_commands_limited_to_three() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        for cmd in ["ls", "ls -a", "ls -l", "ls -la", "dir"] {
            cache.cache_command("list files", cmd, "ctx").unwrap();
        }

        let digest = cache.get_similar_commands("list files").unwrap();
        assert_eq!(digest.matches("- Request:").count(), 3);
    }

    #[test]
    fn test_reliable_commands_exclude_unreliable() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache_in(&dir);
        cache.mark_command_failed("list files", "dir /q", "oops", "ctx").unwrap();
        cache.cache_command("list files", "ls", "ctx").unwrap();

        let digest = cache.get_reliable_commands("list files").unwrap();
        assert!(digest.contains("Command: ls"));
        assert!(!digest.contains("dir /q"));

        let all = cache.get_similar_commands("list files").unwrap();
        assert!(all.contains("dir /q"));
    }

    #[test]
    fn test_optimize_retention_and_dedup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command_cache.jsonl");
        let h = context_hash("ctx");

        let mut reliable = CacheEntry::succeeded("list files", "ls", &h, String::new());
        let mut duplicate = reliable.clone();
        duplicate.user_request = "List Files".to_string();
        duplicate.success_count = 9;
        let mut noisy = CacheEntry::failed("open report", "cat report", &h, "x", String::new());
        noisy.usage_count = 4;
        noisy.failure_count = 4;
        let weak = CacheEntry::failed("open notes", "cat notes", &h, "x", String::new());
        reliable.usage_count = 2;
        reliable.success_count = 2;

        store::write_records_atomic(&path, &[reliable.clone(), duplicate, noisy.clone(), weak])
            .unwrap();

        let mut cache = CommandCache::open(&path);
        let report = cache.optimize().unwrap();

        assert_eq!(report, OptimizeReport { before: 4, after: 2 });
        assert_eq!(cache.entries(), &[reliable, noisy]);

        let snapshot = cache.entries().to_vec();
        let again = cache.optimize().unwrap();
        assert_eq!(again.removed(), 0);
        assert_eq!(cache.entries(), snapshot.as_slice());

        cache.reload();
        assert_eq!(cache.entries(), snapshot.as_slice());
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command_cache.jsonl");
        {
            let mut cache = CommandCache::open(&path);
            cache.cache_command("list files", "ls", "ctx").unwrap();
            cache.mark_command_failed("list files", "ls --bad", "unrecognized option", "ctx").unwrap();
        }

        let cache = CommandCache::open(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.entries()[1].last_error, "unrecognized option");
        assert_eq!(cache.reliable_count(), 1);
    }

    #[test]
    fn test_invalid_records_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command_cache.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"user_request\":\"\",\"command\":\"ls\"}\n",
                "garbage\n",
                "{\"user_request\":\"list files\",\"command\":\"ls\",\"success_count\":2}\n",
            ),
        )
        .unwrap();

        let cache = CommandCache::open(&path);
        assert_eq!(cache.len(), 1);
        assert!(cache.entries()[0].is_reliable());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_failure_keeps_in_memory_view() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut cache = CommandCache::open(blocker.join("command_cache.jsonl"));

        let err = cache.cache_command("list files", "ls", "ctx").unwrap_err();
        assert!(err.is_store_error());
        assert_eq!(cache.find_cached_command("list files", "ctx").as_deref(), Some("ls"));
    }

    #[test]
    fn test_counters_saturate_at_max() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command_cache.jsonl");
        let max = u32::MAX;
        std::fs::write(
            &path,
            format!(
                "{{\"user_request\":\"a\",\"command\":\"ls\",\"context_hash\":\"{}\",\"usage_count\":{max},\"success_count\":{max},\"failure_count\":{}}}\n",
                context_hash("ctx"),
                max - 1,
            ),
        )
        .unwrap();

        let mut cache = CommandCache::open(&path);
        assert!(cache.increment_usage("a").unwrap());
        cache.cache_command("a", "ls", "ctx").unwrap();
        cache.mark_command_failed("a", "ls", "boom", "ctx").unwrap();
        cache.mark_command_failed("a", "ls", "boom", "ctx").unwrap();

        let reopened = CommandCache::open(&path);
        let entry = &reopened.entries()[0];
        assert_eq!(entry.usage_count, max);
        assert_eq!(entry.success_count, max);
        assert_eq!(entry.failure_count, max);
        assert!(!entry.is_reliable());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_store_is_not_overwritten() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command_cache.jsonl");
        {
            let mut cache = CommandCache::open(&path);
            cache.cache_command("list files", "ls", "ctx").unwrap();
            cache.cache_command("show disk", "df -h", "ctx").unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();
        let mut cache = CommandCache::open(&path);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        // Root ignores file modes; nothing to check there
        if !cache.is_unreadable() {
            return;
        }

        let err = cache.cache_command("list files", "ls", "ctx").unwrap_err();
        assert!(err.is_store_error());
        assert!(cache.optimize().unwrap_err().is_store_error());
        assert_eq!(std::fs::read(&path).unwrap(), before);

        // Once readable again, a reload restores writes
        cache.reload();
        assert!(!cache.is_unreadable());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_directory_in_place_of_store_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let mut cache = CommandCache::open(dir.path());
        assert!(cache.is_unreadable());
        assert!(cache.cache_command("list files", "ls", "ctx").unwrap_err().is_store_error());
        assert!(dir.path().is_dir());
    }
}
