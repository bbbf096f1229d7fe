// ABOUTME: Remote job API module
// ABOUTME: Defines the job API seam and its reqwest-backed dbt Cloud implementation

pub mod client;
pub mod models;

use async_trait::async_trait;

use crate::error::Result;
pub use client::DbtCloudClient;
pub use models::{JobRun, RunStatus, RunStep, TriggeredRun};

/// The four remote operations the orchestrator needs.
///
/// `fetch_artifact` is best-effort and reports a missing payload as `None`
/// instead of an error.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn trigger(&self, cause: &str) -> Result<TriggeredRun>;

    async fn get_status(&self, run_id: u64, include_steps: bool) -> Result<JobRun>;

    async fn list_artifacts(&self, run_id: u64) -> Result<Vec<String>>;

    async fn fetch_artifact(&self, run_id: u64, artifact: &str) -> Option<Vec<u8>>;
}
