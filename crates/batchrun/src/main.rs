//! `batchrun` CLI
//!
//! Runs external commands under a concurrency ceiling, either as a batch
//! read from a file or one at a time.

mod batch;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use batchrun_core::config::load_config;
use batchrun_core::{CommandRunner, ExecOutcome, RunnerConfig};

/// Run commands as OS processes with at most N running at once.
#[derive(Debug, Parser)]
#[command(name = "batchrun", version, about)]
struct Cli {
    /// Directory whose `.batchrun/settings.json` is applied (defaults to the
    /// current directory)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Maximum concurrent processes
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Environment tag appended to every command as `--env=<tag>`
    #[arg(long = "env", global = true)]
    environment: Option<String>,

    /// Entry point every command is addressed to
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Interpreter placed in front of the base path
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// Delay between liveness checks, in microseconds
    #[arg(long, global = true)]
    poll_interval_micros: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every command listed in FILE ("-" for stdin), one per line
    Run {
        file: PathBuf,
    },
    /// Run a single command outside admission control
    Exec {
        /// Return right after starting; the process is still awaited before exit.
        /// Must come before COMMAND.
        #[arg(long)]
        detach: bool,

        command: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the resolved configuration as JSON
    Config,
}

impl Cli {
    fn apply_overrides(&self, config: &mut RunnerConfig) {
        if let Some(capacity) = self.capacity {
            config.default_capacity = capacity;
        }
        if let Some(env) = &self.environment {
            config.environment_tag = Some(env.clone());
        }
        if let Some(base_path) = &self.base_path {
            config.base_path.clone_from(base_path);
        }
        if let Some(binary) = &self.binary {
            config.binary_path = Some(binary.clone());
        }
        if let Some(micros) = self.poll_interval_micros {
            config.poll_interval_micros = micros;
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<RunnerConfig> {
    let project_dir = cli
        .project_dir
        .clone()
        .or_else(|| std::env::current_dir().ok());
    let mut config =
        load_config(project_dir.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Process exit status for an `exec` outcome. Signals and codes outside
/// `0..=255` map to 1.
fn exit_status(outcome: ExecOutcome) -> u8 {
    match outcome {
        ExecOutcome::Tracked => 0,
        ExecOutcome::Exited { code } => code.and_then(|c| u8::try_from(c).ok()).unwrap_or(1),
    }
}

#[allow(clippy::print_stdout)]
fn print_config(config: &RunnerConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_filter = format!("batchrun={0},batchrun_core={0}", cli.log_level);
    batchrun_core::tracing_init::init_tracing(&log_filter, cli.log_json);

    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Config => {
            print_config(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { ref file } => {
            let entries = batch::read_batch(file)?;
            info!(
                file = %file.display(),
                commands = entries.len(),
                capacity = config.default_capacity,
                "Starting batch"
            );
            CommandRunner::from_config(&config)?
                .scope(|runner| batch::run_batch(runner, &entries))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec {
            detach,
            ref command,
            ref args,
        } => {
            let outcome = CommandRunner::from_config(&config)?.scope(|runner| {
                runner
                    .execute_single(command, args, !detach)
                    .with_context(|| format!("failed to execute `{command}`"))
            })?;
            Ok(ExitCode::from(exit_status(outcome)))
        }
    }
}
