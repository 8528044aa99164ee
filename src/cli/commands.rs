//! CLI command definitions for draft-forge.
//!
//! `poll` runs the long-lived lease loop, `worker` is the per-job process the
//! poller spawns, and `migrate` prepares the database schema.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::config::AppConfig;
use crate::llm::{LiteLlmClient, LlmGateway};
use crate::pipeline::{read_payload, run_worker};
use crate::scheduler::{JobInputPreparer, LlmSummarizer, ProcessLauncher, Supervisor, TaskPoller};
use crate::storage::Database;

/// Job poller, worker supervisor and content pipeline for form drafts.
#[derive(Parser)]
#[command(name = "draft-forge")]
#[command(about = "Lease content-generation tasks and run them in isolated workers")]
#[command(version)]
#[command(
    long_about = "draft-forge leases pending tasks from the shared todolist table, runs each one in an isolated worker process and stores the generated reports, slides and form texts.\n\nExample usage:\n  draft-forge poll --migrate\n  draft-forge worker --inputs '{\"todo_id\": \"...\"}'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Poll for tasks and supervise one worker at a time.
    Poll(PollArgs),

    /// Run the pipeline for one payload (spawned by `poll`).
    Worker(WorkerArgs),

    /// Apply the database schema.
    Migrate,
}

/// Arguments for the poll command.
#[derive(Parser, Debug)]
pub struct PollArgs {
    /// Seconds to sleep between lease attempts (overrides POLL_INTERVAL_SECS).
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Apply the schema before polling.
    #[arg(long)]
    pub migrate: bool,
}

/// Arguments for the worker command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Worker payload as JSON. Read from stdin when omitted.
    #[arg(long)]
    pub inputs: Option<String>,
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Poll(args) => run_poll_command(args).await,
        Commands::Worker(args) => run_worker_command(args).await,
        Commands::Migrate => run_migrate_command().await,
    }
}

async fn run_poll_command(args: PollArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(secs) = args.interval {
        config = config.with_poll_interval(Duration::from_secs(secs));
        config.validate()?;
    }

    // Fail fast: no polling without a reachable store.
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .context("Failed to connect to database")?,
    );
    if args.migrate {
        let applied = db.run_migrations().await?;
        info!(applied, "Migrations applied");
    }

    let retry = config.retry_policy();
    let client = Arc::new(LiteLlmClient::from_config(&config)?);
    let summary_gateway = Arc::new(LlmGateway::new(
        client,
        config.summary_model.clone(),
        config.research_model.clone(),
    ));
    let summarizer = Arc::new(LlmSummarizer::new(summary_gateway, retry));
    let preparer = JobInputPreparer::new(db.clone(), summarizer, retry);
    let launcher = Arc::new(
        ProcessLauncher::current_exe().context("Failed to determine current executable path")?,
    );

    let supervisor = Supervisor::new(
        db.clone(),
        preparer,
        launcher,
        db.clone(),
        retry,
        config.cancel_check_interval,
    );
    let mut poller = TaskPoller::new(
        db,
        supervisor,
        config.consumer_id.clone(),
        config.poll_interval,
        retry,
    );

    tokio::select! {
        _ = poller.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, poller stopped");
        }
    }
    Ok(())
}

async fn run_worker_command(args: WorkerArgs) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let payload = read_payload(args.inputs.as_deref())?;
    let todo_id = payload.todo_id;

    run_worker(&config, payload)
        .await
        .with_context(|| format!("Worker failed for task {}", todo_id))?;
    Ok(())
}

async fn run_migrate_command() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let applied = db.run_migrations().await?;
    info!(applied, "Migrations applied");
    println!("Applied {} migration step(s)", applied);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_poll_command_defaults() {
        let cli = Cli::try_parse_from(["draft-forge", "poll"]).expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Poll(args) => {
                assert!(args.interval.is_none());
                assert!(!args.migrate);
            }
            _ => panic!("Expected Poll command"),
        }
    }

    #[test]
    fn test_poll_command_with_options() {
        let cli = Cli::try_parse_from(["draft-forge", "poll", "-i", "3", "--migrate", "-l", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Poll(args) => {
                assert_eq!(args.interval, Some(3));
                assert!(args.migrate);
            }
            _ => panic!("Expected Poll command"),
        }
    }

    #[test]
    fn test_worker_command_inputs() {
        let cli = Cli::try_parse_from(["draft-forge", "worker", "--inputs", "{}"]).expect("should parse");
        match cli.command {
            Commands::Worker(args) => assert_eq!(args.inputs.as_deref(), Some("{}")),
            _ => panic!("Expected Worker command"),
        }

        let cli = Cli::try_parse_from(["draft-forge", "worker"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Worker(WorkerArgs { inputs: None })));
    }

    #[test]
    fn test_migrate_command() {
        let cli = Cli::try_parse_from(["draft-forge", "migrate"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Migrate));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        assert!(Cli::try_parse_from(["draft-forge", "poll", "--interval", "soon"]).is_err());
    }
}
