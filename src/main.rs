//! ai - Main CLI Entry Point

use aishell::{
    bootstrap::{self, Bootstrap, InstalledModel, EXIT_CODE_SETUP_NEEDED},
    cli::{Args, Commands, Config, Verbosity},
    conversation::{JsonConversationStore, SessionContext},
    environment::EnvironmentContext,
    executor::ShellExecutor,
    generator::OllamaGenerator,
    learning::{CommandCache, FailureMemory},
    orchestrator::{prompts, Classification, OrchestratorConfig, RetryOrchestrator, RunEvent},
    AssistError,
};
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    init_logging(verbosity.log_level())?;

    if let Err(message) = args.validate() {
        eprintln!("{} {}", "Error:".red(), message);
        std::process::exit(EXIT_CODE_SETUP_NEEDED);
    }

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    match (&args.command, args.request_text()) {
        (Some(Commands::Setup), _) | (None, None) => run_setup(&args, &config).await,
        (Some(Commands::Reset), _) => reset_history(&config),
        (Some(Commands::Optimize { cache, memory }), _) => optimize(&config, *cache, *memory),
        (Some(Commands::Stats), _) => show_stats(&config),
        (Some(Commands::Config), _) => show_config(&config),
        (None, Some(request)) => run_request(&args, &config, &request, verbosity).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

/// Read one line; `None` when the user interrupts or closes input
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    let mut editor = DefaultEditor::new().context("Failed to open terminal")?;
    match editor.readline(prompt) {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e).context("Failed to read input"),
    }
}

fn spinner(message: &str, verbosity: Verbosity) -> ProgressBar {
    if !verbosity.show_progress() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Exit with setup instructions unless Ollama answers
async fn require_ollama(bootstrap: &Bootstrap) {
    if !bootstrap.check_ollama_running().await {
        eprintln!("{} Ollama is not running at {}", "✗".red(), bootstrap.base_url());
        eprintln!("\n{}", bootstrap::ollama_install_hint());
        std::process::exit(EXIT_CODE_SETUP_NEEDED);
    }
}

async fn run_setup(args: &Args, config: &Config) -> Result<()> {
    let bootstrap = Bootstrap::new(&config.ollama_url());
    require_ollama(&bootstrap).await;

    let models = bootstrap.list_models().await?;
    if models.is_empty() {
        eprintln!("{} No models installed.", "✗".red());
        eprintln!("\n{}", bootstrap::model_pull_hint(&config.ollama.default_model));
        std::process::exit(EXIT_CODE_SETUP_NEEDED);
    }

    let model = match &args.model {
        Some(model) if bootstrap::has_model(&models, model) => model.clone(),
        Some(model) => {
            eprintln!("{} Model '{}' is not installed.", "✗".red(), model);
            eprintln!("\n{}", bootstrap::model_pull_hint(model));
            std::process::exit(EXIT_CODE_SETUP_NEEDED);
        }
        None => match select_model(&models, &config.ollama.default_model)? {
            Some(model) => model,
            None => {
                println!("{}", "Aborted.".yellow());
                return Ok(());
            }
        },
    };

    let environment = EnvironmentContext::detect();
    let context = SessionContext::new(&model, environment.clone());
    JsonConversationStore::create(config.context_path(), context)
        .context("Failed to save session context")?;

    println!(
        "\n{} Detected: {} / {} / User: {}",
        "Setup complete!".green().bold(),
        environment.os,
        environment.shell,
        environment.user
    );
    println!("Model: {}", model.cyan());
    Ok(())
}

/// Ask the user to pick one of `models`; `None` when aborted
fn select_model(models: &[InstalledModel], preferred: &str) -> Result<Option<String>> {
    let default_index = models
        .iter()
        .position(|m| m.name == preferred)
        .unwrap_or(0);

    println!("\n{}", "Installed models:".bold());
    for (i, model) in models.iter().enumerate() {
        let marker = if i == default_index { "*" } else { " " };
        println!("  {}{:>2}. {} ({:.1} GB)", marker, i + 1, model.name, model.size_gb());
    }

    loop {
        let prompt = format!("\nSelect a model [{}]: ", default_index + 1);
        let Some(answer) = prompt_line(&prompt)? else {
            return Ok(None);
        };

        if answer.is_empty() {
            return Ok(Some(models[default_index].name.clone()));
        }

        match answer.parse::<usize>() {
            Ok(n) if (1..=models.len()).contains(&n) => return Ok(Some(models[n - 1].name.clone())),
            _ => println!("{} Enter a number between 1 and {}", "!".yellow(), models.len()),
        }
    }
}

async fn run_request(args: &Args, config: &Config, request: &str, verbosity: Verbosity) -> Result<()> {
    let conversation = JsonConversationStore::open(config.context_path());
    if !conversation.exists() {
        println!("{}", "No setup found. Running setup first.".yellow());
        return run_setup(args, config).await;
    }

    let session = conversation.context().clone();
    let model = if args.model.is_none() && !session.model_name.is_empty() {
        session.model_name.clone()
    } else {
        config.ollama.default_model.clone()
    };

    let bootstrap = Bootstrap::new(&config.ollama_url());
    require_ollama(&bootstrap).await;

    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let environment = &session.environment;

    let prompt_paths = config.system_prompt_paths();
    let prompt_refs: Vec<_> = prompt_paths.iter().map(PathBuf::as_path).collect();
    let template = prompts::load_system_prompt(&prompt_refs);

    let orchestrator_config = OrchestratorConfig {
        context: environment.fingerprint(),
        system_prompt: prompts::render_system_prompt(&template, &environment.describe()),
        failure_policy: config.execution.failure_policy,
        max_history_exchanges: config.history.max_exchanges,
        working_dir: working_dir.clone(),
    };

    let generator = OllamaGenerator::with_config(&config.ollama_url(), &model, config.request_timeout())?;
    let executor = ShellExecutor::default()
        .with_timeout(config.execution_timeout())
        .with_working_dir(working_dir);

    let mut orchestrator = RetryOrchestrator::new(
        CommandCache::open(config.cache_path()),
        FailureMemory::open(config.memory_path()),
        Box::new(generator),
        Box::new(executor),
        Box::new(conversation),
        orchestrator_config,
    );

    let pb = spinner("Thinking...", verbosity);
    let prepared = orchestrator.prepare(request).await;
    pb.finish_and_clear();

    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(AssistError::GenerationFailure(message)) => {
            eprintln!("{} {}", "Error:".red(), message);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    print!("{} {}", ">".green(), prepared.command.green());
    if prepared.from_cache {
        print!(" {}", "[CACHED]".cyan());
    }
    println!();

    if config.execution.confirm {
        let answer = prompt_line("\nExecute? [Y/n] ")?;
        let accepted = matches!(
            answer.as_deref(),
            Some("") | Some("y") | Some("Y") | Some("yes") | Some("Yes")
        );
        if !accepted {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
    }

    let mut observer = |event: &RunEvent| print_event(event, verbosity);
    let report = orchestrator.execute_observed(prepared, &mut observer).await?;

    if report.succeeded() {
        if report.retried() {
            println!("{}", "[Auto-Retry] Success!".green());
        }
        if let Some(diagnosis) = report.diagnosis.as_ref().filter(|d| d.is_failure()) {
            println!("{} {}", "Warning:".yellow(), diagnosis.summary);
        }
    } else {
        eprintln!("{} {}", "✗ Failed:".red().bold(), report.final_command());
        if let Some(diagnosis) = &report.diagnosis {
            if !diagnosis.summary.is_empty() {
                eprintln!("  {} {}", "Cause:".bold(), diagnosis.summary);
            }
            if !diagnosis.fix.is_empty() {
                eprintln!("  {} {}", "Try:".bold(), diagnosis.fix.cyan());
            }
        }
    }

    Ok(())
}

fn print_event(event: &RunEvent, verbosity: Verbosity) {
    match event {
        RunEvent::Executing { command, attempt } if *attempt > 1 => {
            println!("{} {}", "[Auto-Retry] Trying alternative:".cyan(), command);
        }
        RunEvent::Executing { .. } => {}
        RunEvent::Executed {
            output,
            classification,
            ..
        } => {
            if !output.stdout.is_empty() {
                print!("{}", output.stdout);
                if !output.stdout.ends_with('\n') {
                    println!();
                }
            }
            if output.has_stderr() {
                let stderr = output.stderr.trim_end();
                match classification {
                    Classification::Failure => eprintln!("{}", stderr.red()),
                    _ => eprintln!("{}", stderr.yellow()),
                }
            }
            if verbosity.show_details() {
                eprintln!(
                    "{}",
                    format!("[exit {} in {}ms]", output.exit_code, output.duration_ms).dimmed()
                );
            }
            if classification.is_failure() {
                eprintln!("{} (exit code {})", "Command failed.".red(), output.exit_code);
            }
        }
        RunEvent::SeekingAlternative => {
            println!("{}", "[Auto-Retry] Attempting to fix command...".yellow());
        }
        RunEvent::NoAlternative => {
            println!("{}", "[Auto-Retry] No alternative found.".yellow());
        }
        RunEvent::Diagnosing => {
            if verbosity.show_details() {
                eprintln!("{}", "Diagnosing...".dimmed());
            }
        }
    }
}

fn reset_history(config: &Config) -> Result<()> {
    let mut store = JsonConversationStore::open(config.context_path());
    if !store.exists() {
        println!("No conversation history.");
        return Ok(());
    }

    store.clear_history().context("Failed to clear history")?;
    println!("{} Conversation history cleared.", "✓".green());
    Ok(())
}

fn optimize(config: &Config, cache: bool, memory: bool) -> Result<()> {
    let (cache, memory) = if !cache && !memory { (true, true) } else { (cache, memory) };

    if cache {
        let mut store = CommandCache::open(config.cache_path());
        let report = store.optimize().context("Failed to optimize command cache")?;
        println!(
            "{} Command cache: {} → {} entries ({} removed)",
            "✓".green(),
            report.before,
            report.after,
            report.removed()
        );
    }

    if memory {
        let store = FailureMemory::open(config.memory_path());
        let report = store.optimize().context("Failed to optimize failure memory")?;
        println!(
            "{} Failure memory: {} → {} entries ({} removed)",
            "✓".green(),
            report.before,
            report.after,
            report.removed()
        );
    }

    Ok(())
}

fn show_stats(config: &Config) -> Result<()> {
    let cache = CommandCache::open(config.cache_path());
    let memory = FailureMemory::open(config.memory_path());
    let session = JsonConversationStore::load(&config.context_path());

    println!("\n{}", "aishell statistics".bold());
    println!("  State directory: {}", config.state_dir().display());
    if let Some(session) = session {
        println!("  Model:           {}", session.model_name);
    }
    println!();
    println!("Command cache:");
    println!("  Entries:  {}", cache.len());
    println!("  Reliable: {}", cache.reliable_count());
    println!();
    println!("Failure memory:");
    println!("  Entries:  {}", memory.entries().len());
    println!();

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.to_toml()?);
    Ok(())
}
