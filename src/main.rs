// ABOUTME: Command-line entry point for the dbt Cloud job runner
// ABOUTME: Parses flags, sets up logging and maps the run outcome to a process exit code

use anyhow::Context;
use clap::Parser;
use dbt_cloud_runner::{run_job, ConfigLayer, RunState, RunnerConfig, RunnerError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbt-cloud-runner")]
#[command(
    about = "Trigger a dbt Cloud job, wait for the result and download its artifacts",
    version
)]
struct Cli {
    /// Path to a TOML config file; flags override its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// dbt Cloud account ID
    #[arg(long)]
    account_id: Option<u64>,

    /// dbt Cloud job ID
    #[arg(long)]
    job_id: Option<u64>,

    /// dbt Cloud API token
    #[arg(long, env = "DBT_CLOUD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Free-text cause sent with the trigger request
    #[arg(long)]
    cause: Option<String>,

    /// Return right after triggering instead of waiting for the run to finish
    #[arg(long)]
    no_wait: bool,

    /// Give up waiting after this many minutes (0 or unset waits forever)
    #[arg(long)]
    max_wait_time: Option<u64>,

    /// Seconds between status polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Directory for result tables and artifacts
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            account_id: self.account_id,
            job_id: self.job_id,
            api_key: self.api_key.clone(),
            cause: self.cause.clone(),
            wait_for_result: self.no_wait.then_some(false),
            max_wait_time: self.max_wait_time,
            poll_interval_secs: self.poll_interval_secs,
            base_url: self.base_url.clone(),
            output_dir: self.output_dir.clone(),
            request_timeout_secs: None,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<RunnerConfig> {
    let file_layer = match &cli.config {
        Some(path) => ConfigLayer::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ConfigLayer::default(),
    };
    Ok(RunnerConfig::resolve(file_layer.merge(cli.overrides()))?)
}

async fn execute(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let outcome = run_job(&config).await?;

    match outcome.state {
        RunState::Triggered => {
            tracing::info!(run_id = outcome.run_id, "Job run triggered, not waiting for result")
        }
        _ => tracing::info!(
            run_id = outcome.run_id,
            stored = outcome.stored_artifacts.len(),
            missing = outcome.missing_artifacts.len(),
            "Job run finished successfully"
        ),
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<RunnerError>() {
        Some(runner_err) if runner_err.is_user_facing() => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            exit_code_for(&err)
        }
    }
}
