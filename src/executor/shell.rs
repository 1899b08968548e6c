//! Shell executor
//!
//! Runs generated commands through the platform shell with a timeout.
//! Spawn failures and timeouts are reported as an `ExecutionOutput` with
//! exit code -1, never as errors: a command that cannot run is a failed
//! command.

use crate::errors::Result;
use crate::executor::{ExecutionOutput, Executor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Default execution timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Tokens that only make sense in PowerShell
const POWERSHELL_MARKERS: &[&str] = &[
    "Get-", "Set-", "New-", "Test-", "Sort-", "Select-", "Where-Object", "Write-Output",
    "$env:", "$(",
];

/// Shell used to interpret commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Sh,
    Bash,
    Zsh,
    Cmd,
    PowerShell,
}

impl ShellKind {
    /// Shell of the current environment
    pub fn detect() -> Self {
        if cfg!(windows) {
            if std::env::var_os("PSModulePath").is_some() {
                ShellKind::PowerShell
            } else {
                ShellKind::Cmd
            }
        } else {
            std::env::var("SHELL")
                .ok()
                .and_then(|path| Self::from_program(&path))
                .unwrap_or(ShellKind::Sh)
        }
    }

    /// Map a shell program path such as `/bin/zsh` to a kind
    pub fn from_program(path: &str) -> Option<Self> {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let name = name.trim_end_matches(".exe").to_lowercase();
        match name.as_str() {
            "sh" | "dash" => Some(ShellKind::Sh),
            "bash" => Some(ShellKind::Bash),
            "zsh" => Some(ShellKind::Zsh),
            "cmd" => Some(ShellKind::Cmd),
            "powershell" | "pwsh" => Some(ShellKind::PowerShell),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ShellKind::Sh => "sh",
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Cmd => "CMD",
            ShellKind::PowerShell => "PowerShell",
        }
    }

    /// Program and arguments that run `command` in this shell.
    ///
    /// From `cmd`, commands that look like PowerShell are routed to
    /// PowerShell instead.
    pub fn invocation(&self, command: &str) -> (String, Vec<String>) {
        match self {
            ShellKind::Sh => ("sh".to_string(), vec!["-c".to_string(), command.to_string()]),
            ShellKind::Bash => ("bash".to_string(), vec!["-c".to_string(), command.to_string()]),
            ShellKind::Zsh => ("zsh".to_string(), vec!["-c".to_string(), command.to_string()]),
            ShellKind::Cmd if looks_like_powershell(command) => {
                ShellKind::PowerShell.invocation(command)
            }
            ShellKind::Cmd => ("cmd".to_string(), vec!["/C".to_string(), command.to_string()]),
            ShellKind::PowerShell => (
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-ExecutionPolicy".to_string(),
                    "Bypass".to_string(),
                    "-Command".to_string(),
                    command.to_string(),
                ],
            ),
        }
    }
}

/// Whether a command uses PowerShell-only syntax
pub fn looks_like_powershell(command: &str) -> bool {
    POWERSHELL_MARKERS.iter().any(|marker| command.contains(marker))
}

/// Trim and remove redundant wrapping double quotes (`""ls""` → `ls`)
pub fn sanitize_command(raw: &str) -> String {
    let mut command = raw.trim();
    while command.len() >= 2 && command.starts_with('"') && command.ends_with('"') {
        let inner = command[1..command.len() - 1].trim();
        // `"a" "b"` is two quoted words, not one wrapped command
        if inner.contains('"') && !(inner.starts_with('"') && inner.ends_with('"')) {
            break;
        }
        command = inner;
    }
    command.to_string()
}

/// Executes commands through a shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: ShellKind,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(ShellKind::detect())
    }
}

impl ShellExecutor {
    pub fn new(shell: ShellKind) -> Self {
        Self {
            shell,
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell(&self) -> ShellKind {
        self.shell
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionOutput> {
        let start = Instant::now();
        let command = sanitize_command(command);

        if command.is_empty() {
            return Ok(ExecutionOutput::not_run("Command cannot be empty"));
        }

        let (program, args) = self.shell.invocation(&command);
        debug!(%program, ?args, "spawning command");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // `output()` reads both pipes concurrently until the child exits
        let mut output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => ExecutionOutput::new(
                output.status.code().unwrap_or(super::NO_EXIT_CODE),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
            Ok(Err(e)) => ExecutionOutput::not_run(format!("Failed to execute command: {}", e)),
            Err(_) => ExecutionOutput::not_run(format!(
                "Command timed out after {}s",
                self.timeout.as_secs()
            )),
        };
        output.duration_ms = start.elapsed().as_millis() as u64;

        Ok(output)
    }
}
