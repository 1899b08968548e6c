//! Adaptive learning substrate
//!
//! Components:
//! - Similarity: request normalization and intent-weighted Jaccard scoring
//! - Command Cache: reliability-weighted (request, context, command) store
//! - Failure Memory: append-only log of diagnosed failures
//!
//! Both stores persist as newline-delimited JSON and are owned by the
//! orchestrator for the duration of one invocation.

pub mod cache;
pub mod failures;
pub mod similarity;
pub mod store;
pub mod types;

pub use cache::{context_hash, CommandCache};
pub use failures::FailureMemory;
pub use similarity::{normalize, similarity};
pub use types::{CacheEntry, ExecutionStatus, MemoryEntry, OptimizeReport};

/// Current time as an ISO-8601 UTC string with second precision
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
