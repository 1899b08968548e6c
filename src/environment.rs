//! Host environment detection
//!
//! The fingerprint (OS + shell) keys the command cache; the full
//! description also names the user and is injected into the system prompt.

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::executor::ShellKind;

/// Detected host environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub os: String,
    pub shell: String,
    #[serde(default)]
    pub user: String,
}

impl EnvironmentContext {
    pub fn new(os: impl Into<String>, shell: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            shell: shell.into(),
            user: user.into(),
        }
    }

    /// Detect the current OS, shell and user
    pub fn detect() -> Self {
        let os = System::long_os_version()
            .or_else(System::name)
            .unwrap_or_else(|| std::env::consts::OS.to_string());

        let shell = ShellKind::detect().display_name().to_string();

        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self { os, shell, user }
    }

    /// Descriptor hashed into the cache context
    pub fn fingerprint(&self) -> String {
        format!("Operating System: {}\nShell: {}", self.os, self.shell)
    }

    /// Environment block for the system prompt
    pub fn describe(&self) -> String {
        format!("{}\nUser: {}", self.fingerprint(), self.user)
    }
}

impl Default for EnvironmentContext {
    fn default() -> Self {
        Self::detect()
    }
}
