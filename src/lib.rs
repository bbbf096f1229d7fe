// ABOUTME: Library root for the dbt Cloud job runner
// ABOUTME: Wires configuration, the API client, the orchestrator and the filesystem sink together

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod remote;
pub mod retry;
pub mod sink;

pub use config::{ConfigLayer, RunnerConfig};
pub use error::{Result, RunnerError};
pub use orchestrator::{JobOrchestrator, OrchestratorSettings, RunOutcome, RunState};
pub use remote::{DbtCloudClient, JobApi};
pub use sink::{FsSink, ResultSink};

/// Trigger the configured job and drive it to completion, writing results
/// under `config.output_dir`.
pub async fn run_job(config: &RunnerConfig) -> Result<RunOutcome> {
    tracing::debug!(?config, "Starting job run");

    let client = DbtCloudClient::new(
        &config.base_url,
        config.account_id,
        config.job_id,
        &config.api_key,
        config.request_timeout,
    )?;
    let sink = FsSink::new(&config.output_dir);

    JobOrchestrator::new(&client, &sink, config.orchestrator_settings())
        .run(&config.cause)
        .await
}
