// ABOUTME: Job lifecycle orchestration: trigger, poll until terminal, collect artifacts
// ABOUTME: Owns the run state machine and the wait budget, and records results in the sink

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Result, RunnerError};
use crate::remote::{JobApi, JobRun, RunStatus};
use crate::retry::RetryPolicy;
use crate::sink::{Record, ResultSink, STATUS_TABLE, TRIGGER_TABLE};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Triggered,
    Polling,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// Upper bound on how long the orchestrator keeps polling. `max = None` waits
/// forever.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    start: Instant,
    max: Option<Duration>,
}

impl WaitBudget {
    pub fn start(max: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            max,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_exhausted(&self) -> bool {
        match self.max {
            Some(max) => self.elapsed() >= max,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub wait_for_result: bool,
    pub poll_interval: Duration,
    pub max_wait: Option<Duration>,
    pub status_retry: RetryPolicy,
    pub list_retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            wait_for_result: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            status_retry: RetryPolicy::new("get run status"),
            list_retry: RetryPolicy::new("list artifacts"),
        }
    }
}

/// What a completed orchestration produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: u64,
    pub state: RunState,
    pub stored_artifacts: Vec<String>,
    pub missing_artifacts: Vec<String>,
    pub final_status: Option<JobRun>,
}

pub struct JobOrchestrator<'a, A: JobApi, S: ResultSink> {
    api: &'a A,
    sink: &'a S,
    settings: OrchestratorSettings,
}

impl<'a, A: JobApi, S: ResultSink> JobOrchestrator<'a, A, S> {
    pub fn new(api: &'a A, sink: &'a S, settings: OrchestratorSettings) -> Self {
        Self {
            api,
            sink,
            settings,
        }
    }

    /// Drive one job run end to end.
    ///
    /// Returns `Ok` only for a run that was triggered without waiting or that
    /// finished successfully. Failed, cancelled and timed out runs come back
    /// as the matching `RunnerError` after their final status is recorded.
    pub async fn run(&self, cause: &str) -> Result<RunOutcome> {
        let triggered = self.api.trigger(cause).await?;
        let run_id = triggered.id;
        tracing::info!(run_id, href = %triggered.href, "Triggered job run");
        self.sink
            .write_record(TRIGGER_TABLE, &triggered.to_record())
            .await?;

        if !self.settings.wait_for_result {
            return Ok(RunOutcome {
                run_id,
                state: RunState::Triggered,
                stored_artifacts: Vec::new(),
                missing_artifacts: Vec::new(),
                final_status: None,
            });
        }

        let (state, last_seen, waited) = self.poll_until_terminal(run_id).await?;

        match state {
            RunState::Succeeded => {
                let (stored, missing) = self.collect_artifacts(run_id).await?;
                let final_status = self.record_final_status(run_id).await?;
                Ok(RunOutcome {
                    run_id,
                    state,
                    stored_artifacts: stored,
                    missing_artifacts: missing,
                    final_status: Some(final_status),
                })
            }
            RunState::Failed => {
                self.record_final_status_lenient(run_id).await;
                Err(RunnerError::JobFailed {
                    run_id,
                    steps: last_seen.run_steps.unwrap_or_default(),
                })
            }
            RunState::Cancelled => {
                self.record_final_status_lenient(run_id).await;
                Err(RunnerError::JobCancelled { run_id })
            }
            RunState::TimedOut => {
                self.record_final_status_lenient(run_id).await;
                Err(RunnerError::TimeoutExceeded { run_id, waited })
            }
            RunState::Triggered | RunState::Polling => Err(RunnerError::Protocol {
                operation: "get run status",
                reason: format!("polling stopped in non-terminal state {:?}", state),
            }),
        }
    }

    /// Poll the run until the remote side reports a terminal status or the
    /// wait budget runs out. Returns the terminal state, the status response
    /// that caused it and how long polling took.
    async fn poll_until_terminal(&self, run_id: u64) -> Result<(RunState, JobRun, Duration)> {
        let budget = WaitBudget::start(self.settings.max_wait);
        tracing::debug!(run_id, "Waiting for job run to finish");

        loop {
            tokio::time::sleep(self.settings.poll_interval).await;

            let run = self
                .settings
                .status_retry
                .run(|| self.api.get_status(run_id, true))
                .await?;
            tracing::info!(run_id, status = %run.status, "Job status");

            if run.status.is_terminal() {
                let state = classify(run.status);
                tracing::debug!(run_id, ?state, "Job run reached terminal state");
                return Ok((state, run, budget.elapsed()));
            }

            if budget.is_exhausted() {
                tracing::warn!(
                    run_id,
                    elapsed_secs = budget.elapsed().as_secs(),
                    "Max wait time reached, giving up on job run"
                );
                return Ok((RunState::TimedOut, run, budget.elapsed()));
            }
        }
    }

    /// List the run's artifacts and store every one that can be fetched.
    /// An artifact that cannot be downloaded or stored is logged and skipped.
    async fn collect_artifacts(&self, run_id: u64) -> Result<(Vec<String>, Vec<String>)> {
        let artifacts = self
            .settings
            .list_retry
            .run(|| self.api.list_artifacts(run_id))
            .await?;
        tracing::info!(run_id, count = artifacts.len(), "Fetching run artifacts");

        let mut stored = Vec::new();
        let mut missing = Vec::new();
        for artifact in artifacts {
            match self.api.fetch_artifact(run_id, &artifact).await {
                Some(content) => match self.sink.store(&artifact, &content).await {
                    Ok(()) => {
                        tracing::info!(run_id, artifact = %artifact, "Stored artifact");
                        stored.push(artifact);
                    }
                    Err(e) => {
                        tracing::warn!(
                            run_id,
                            artifact = %artifact,
                            error = %e,
                            "Cannot store artifact"
                        );
                        missing.push(artifact);
                    }
                },
                None => missing.push(artifact),
            }
        }

        if !missing.is_empty() {
            tracing::warn!(run_id, missing = ?missing, "Some artifacts could not be retrieved");
        }
        Ok((stored, missing))
    }

    async fn record_final_status(&self, run_id: u64) -> Result<JobRun> {
        let run = self.api.get_status(run_id, false).await?;
        let mut row: Record = run.to_record();
        row.push(("ts".to_string(), chrono::Local::now().to_rfc3339()));
        self.sink.write_record(STATUS_TABLE, &row).await?;
        Ok(run)
    }

    async fn record_final_status_lenient(&self, run_id: u64) {
        if let Err(e) = self.record_final_status(run_id).await {
            tracing::warn!(run_id, error = %e, "Failed to record final job status");
        }
    }
}

fn classify(status: RunStatus) -> RunState {
    match status {
        RunStatus::Success => RunState::Succeeded,
        RunStatus::Error => RunState::Failed,
        RunStatus::Cancelled => RunState::Cancelled,
        RunStatus::Queued | RunStatus::Starting | RunStatus::Running | RunStatus::Unknown(_) => {
            RunState::Polling
        }
    }
}
