//! Prompt templates

use std::path::Path;
use tracing::{debug, warn};

/// Placeholder replaced by the environment description
pub const ENV_BLOCK: &str = "{ENV_BLOCK}";

/// Built-in system prompt template
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You translate natural-language requests into a single shell command.

ENVIRONMENT:
{ENV_BLOCK}

RULES:
1. Output ONLY the command, on one line when possible
2. No explanations, no Markdown, no code fences
3. Use syntax valid for the shell above
4. Prefer read-only commands when the request is ambiguous
5. If earlier commands in this conversation failed, do not repeat them"#;

/// System prompt for execution diagnosis
pub const ANALYZER_SYSTEM_PROMPT: &str = "You are a system analyzer. You inspect the result of a \
shell command and answer with exactly one JSON object and nothing else.";

/// Appended after the failure-memory digest
const MEMORY_DIRECTIVE: &str = "CRITICAL: If the user request matches a past failure case above, \
you MUST propose a DIFFERENT command. Do not repeat mistakes.";

/// Appended after the cache digest
const CACHE_DIRECTIVE: &str = "HINT: The above cached commands worked successfully for similar \
requests. Consider using a similar approach for the current request if applicable.";

/// Read a prompt template, falling back to the built-in one.
///
/// The first readable, non-empty file among `candidates` wins.
pub fn load_system_prompt(candidates: &[&Path]) -> String {
    for path in candidates {
        match std::fs::read_to_string(path) {
            Ok(template) if !template.trim().is_empty() => {
                debug!(path = %path.display(), "using system prompt template");
                return template;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read system prompt"),
        }
    }

    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Fill `{ENV_BLOCK}` in a template
pub fn render_system_prompt(template: &str, env_block: &str) -> String {
    template.replace(ENV_BLOCK, env_block)
}

/// System prompt for command generation, with learned context appended
pub fn build_generation_prompt(
    system_prompt: &str,
    memory_digest: Option<&str>,
    cache_digest: Option<&str>,
) -> String {
    let mut prompt = system_prompt.trim_end().to_string();

    if let Some(digest) = memory_digest {
        prompt.push_str("\n\n");
        prompt.push_str(digest.trim_end());
        prompt.push('\n');
        prompt.push_str(MEMORY_DIRECTIVE);
    }

    if let Some(digest) = cache_digest {
        prompt.push_str("\n\n");
        prompt.push_str(digest.trim_end());
        prompt.push('\n');
        prompt.push_str(CACHE_DIRECTIVE);
    }

    prompt
}

/// Request for an alternative to a failed command
pub fn fix_prompt(request: &str, failed_command: &str, error: &str) -> String {
    format!(
        "The following command FAILED:\n\
         USER REQUEST: {request}\n\
         FAILED COMMAND: {failed_command}\n\
         ERROR: {error}\n\n\
         TASK: Generate an ALTERNATIVE command that will work. Common fixes:\n\
         - If the executable is not found: locate it first or use an equivalent tool\n\
         - If there is a syntax error: fix the syntax for this shell\n\
         - If permission is denied: suggest an approach that does not need it\n\n\
         Output ONLY the corrected command, nothing else.",
        request = request,
        failed_command = failed_command,
        error = error.trim(),
    )
}

/// Request for a structured verdict about one execution
pub fn diagnosis_prompt(request: &str, command: &str, exit_code: i32, stderr: &str) -> String {
    format!(
        "USER REQUEST: {request}\n\
         COMMAND: {command}\n\
         EXIT CODE: {exit_code}\n\
         STDERR:\n{stderr}\n\n\
         Decide whether the command achieved the request. Respond with one JSON object:\n\
         {{\"status\": \"success\" or \"fail\", \
         \"error_signature\": \"short error key, e.g. FileNotFound\", \
         \"summary\": \"one sentence cause\", \
         \"fix\": \"a command that would work instead, or empty\"}}",
        request = request,
        command = command,
        exit_code = exit_code,
        stderr = stderr.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_replaces_env_block() {
        let prompt = render_system_prompt(DEFAULT_SYSTEM_PROMPT, "Operating System: Linux\nShell: bash");
        assert!(prompt.contains("Shell: bash"));
        assert!(!prompt.contains(ENV_BLOCK));
    }

    #[test]
    fn test_load_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "  \n").unwrap();

        assert_eq!(load_system_prompt(&[missing.as_path(), empty.as_path()]), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(load_system_prompt(&[]), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_load_first_readable_template() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let custom = dir.path().join("system_prompt.txt");
        std::fs::write(&custom, "CTX: {ENV_BLOCK}. TASK: Output raw command.").unwrap();

        let template = load_system_prompt(&[missing.as_path(), custom.as_path()]);
        assert_eq!(
            render_system_prompt(&template, "Shell: zsh"),
            "CTX: Shell: zsh. TASK: Output raw command."
        );
    }

    #[test]
    fn test_generation_prompt_without_context() {
        assert_eq!(build_generation_prompt("BASE\n", None, None), "BASE");
    }

    #[test]
    fn test_generation_prompt_order() {
        let prompt = build_generation_prompt(
            "BASE",
            Some("PAST FAILURES (from memory):\n- Failed command: x\n  Fix: y\n"),
            Some("CACHED COMMANDS (similar requests):\n- Request: \"a\"\n"),
        );

        let memory = prompt.find("PAST FAILURES").unwrap();
        let critical = prompt.find("CRITICAL:").unwrap();
        let cache = prompt.find("CACHED COMMANDS").unwrap();
        let hint = prompt.find("HINT:").unwrap();
        assert!(memory < critical && critical < cache && cache < hint);
    }

    #[test]
    fn test_fix_prompt_contents() {
        let prompt = fix_prompt("open report", "cat report.txt", "No such file\n");
        assert!(prompt.contains("USER REQUEST: open report"));
        assert!(prompt.contains("FAILED COMMAND: cat report.txt"));
        assert!(prompt.contains("ERROR: No such file\n"));
        assert!(prompt.ends_with("Output ONLY the corrected command, nothing else."));
    }

    #[test]
    fn test_diagnosis_prompt_asks_for_json() {
        let prompt = diagnosis_prompt("open report", "cat report.txt", 1, "No such file");
        assert!(prompt.contains("EXIT CODE: 1"));
        assert!(prompt.contains("\"error_signature\""));
        assert!(prompt.contains("{\"status\""));
    }
}
