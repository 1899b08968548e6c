//! Command-line argument parsing for aishell

use crate::cli::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ai - turn a plain-language request into a shell command, run it, and learn from the result
#[derive(Parser, Debug)]
#[command(name = "ai")]
#[command(version)]
#[command(about = "Turn a plain-language request into a shell command and run it", long_about = None)]
pub struct Args {
    /// What you want to do, e.g. `ai list files larger than 10MB`
    #[arg(value_name = "REQUEST")]
    pub request: Vec<String>,

    /// Ollama model to use (overrides setup and config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Ollama host
    #[arg(long)]
    pub host: Option<String>,

    /// Ollama port
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Pick a model and detect the environment
    Setup,

    /// Clear conversation history
    Reset,

    /// Curate the learning stores
    Optimize {
        /// Optimize the command cache
        #[arg(long)]
        cache: bool,

        /// Optimize the failure memory
        #[arg(long)]
        memory: bool,
    },

    /// Show learning store statistics
    Stats,

    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// The request words joined, or `None` when no request was given
    pub fn request_text(&self) -> Option<String> {
        let text = self.request.join(" ");
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// A request and a subcommand are mutually exclusive
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_some() && self.request_text().is_some() {
            return Err("Cannot specify a request together with a subcommand.".to_string());
        }

        Ok(())
    }

    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.ollama.host = host.clone();
        }
        if let Some(port) = self.port {
            config.ollama.port = port;
        }
        if let Some(model) = &self.model {
            config.ollama.default_model = model.clone();
        }
        if self.yes {
            config.execution.confirm = false;
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should echo command output details such as exit codes
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
