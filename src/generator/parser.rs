//! Model reply post-processing
//!
//! Models wrap commands in Markdown despite instructions, and embed the
//! diagnosis JSON in prose. Both are recovered here.

use crate::learning::types::ExecutionStatus;

/// Code-fence language tags dropped from the first line of a reply
const LANGUAGE_TAGS: &[&str] = &[
    "bash", "sh", "zsh", "shell", "console", "powershell", "pwsh", "ps1", "cmd", "bat",
];

/// Longest error signature derived from raw stderr
const FALLBACK_SIGNATURE_LEN: usize = 80;

/// Extract the bare command from a model reply.
///
/// Strips code fences and backticks, drops a leading language-tag line and
/// surrounding whitespace. Returns an empty string when nothing is left.
pub fn clean_command(raw: &str) -> String {
    let without_ticks: String = raw.chars().filter(|c| *c != '`').collect();
    let trimmed = without_ticks.trim();

    let body = match trimmed.split_once('\n') {
        Some((first, rest)) if LANGUAGE_TAGS.contains(&first.trim().to_lowercase().as_str()) => rest,
        _ => trimmed,
    };

    body.trim().to_string()
}

/// Generator verdict about an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub status: ExecutionStatus,
    pub error_signature: String,
    pub summary: String,
    pub fix: String,
}

impl Diagnosis {
    /// Parse the JSON object embedded in a model reply.
    ///
    /// Everything between the first `{` and the last `}` is parsed; status
    /// values other than `success` count as failures.
    pub fn parse(reply: &str) -> Option<Self> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        if end <= start {
            return None;
        }

        let value: serde_json::Value = serde_json::from_str(&reply[start..=end]).ok()?;
        let object = value.as_object()?;

        let field = |name: &str| {
            object
                .get(name)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let status = if field("status").eq_ignore_ascii_case("success") {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Fail
        };

        Some(Self {
            status,
            error_signature: field("error_signature"),
            summary: field("summary"),
            fix: field("fix"),
        })
    }

    /// Verdict used when the generator is unavailable or unparseable
    pub fn fallback(stderr: &str, exit_code: i32) -> Self {
        let first_line = stderr.lines().map(str::trim).find(|l| !l.is_empty());
        let error_signature = match first_line {
            Some(line) => line.chars().take(FALLBACK_SIGNATURE_LEN).collect(),
            None => format!("ExitCode{}", exit_code),
        };

        Self {
            status: ExecutionStatus::Fail,
            error_signature,
            summary: String::new(),
            fix: String::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == ExecutionStatus::Fail
    }
}
