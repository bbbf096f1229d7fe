// ABOUTME: HTTP client for the dbt Cloud v2 API
// ABOUTME: Handles job triggering, run status, artifact listing and artifact download

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::models::{Envelope, ErrorEnvelope, JobRun, TriggerRequest, TriggeredRun};
use super::JobApi;
use crate::error::{Result, RunnerError};

pub const DEFAULT_BASE_URL: &str = "https://cloud.getdbt.com";

const INVALID_TOKEN_MESSAGE: &str = "Invalid token.";
const RUN_DETAIL: &str = r#"["run_steps","job"]"#;

pub struct DbtCloudClient {
    client: Client,
    api_base_url: String,
    account_id: u64,
    job_id: u64,
    auth_header: String,
}

impl DbtCloudClient {
    pub fn new(
        api_base_url: &str,
        account_id: u64,
        job_id: u64,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RunnerError::Config("API key must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RunnerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            account_id,
            job_id,
            auth_header: format!("Token {}", api_key),
        })
    }

    fn account_url(&self) -> String {
        format!("{}/api/v2/accounts/{}", self.api_base_url, self.account_id)
    }

    fn run_url(&self, run_id: u64) -> String {
        format!("{}/runs/{}/", self.account_url(), run_id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| classify_transport(operation, e))
    }

    async fn read_body(operation: &'static str, response: Response) -> Result<String> {
        response
            .text()
            .await
            .map_err(|e| classify_transport(operation, e))
    }
}

#[async_trait]
impl JobApi for DbtCloudClient {
    async fn trigger(&self, cause: &str) -> Result<TriggeredRun> {
        const OP: &str = "trigger job";
        let url = format!("{}/jobs/{}/run/", self.account_url(), self.job_id);

        let response = self
            .send(OP, self.client.post(&url).json(&TriggerRequest { cause }))
            .await?;
        let status = response.status();
        let body = Self::read_body(OP, response).await?;

        if !status.is_success() {
            if is_invalid_credential(status, &body) {
                return Err(RunnerError::Auth);
            }
            return Err(RunnerError::RemoteRequest {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        parse_data(OP, &body)
    }

    async fn get_status(&self, run_id: u64, include_steps: bool) -> Result<JobRun> {
        const OP: &str = "get run status";
        let mut request = self.client.get(self.run_url(run_id));
        if include_steps {
            request = request.query(&[("include_related", RUN_DETAIL)]);
        }

        let response = self.send(OP, request).await?;
        let status = response.status();
        let body = Self::read_body(OP, response).await?;

        if !status.is_success() {
            return Err(RunnerError::RemoteRequest {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        parse_data(OP, &body)
    }

    async fn list_artifacts(&self, run_id: u64) -> Result<Vec<String>> {
        const OP: &str = "list artifacts";
        let url = format!("{}artifacts/", self.run_url(run_id));

        let response = self.send(OP, self.client.get(&url)).await?;
        let status = response.status();
        let body = Self::read_body(OP, response).await?;

        if !status.is_success() {
            return Err(RunnerError::RemoteRequest {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        parse_data(OP, &body)
    }

    async fn fetch_artifact(&self, run_id: u64, artifact: &str) -> Option<Vec<u8>> {
        let url = format!(
            "{}artifacts/{}",
            self.run_url(run_id),
            artifact.trim_start_matches('/')
        );

        let response = match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(run_id, artifact, error = %e, "Cannot fetch artifact");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                run_id,
                artifact,
                status = status.as_u16(),
                body = %body,
                "Cannot save artifact"
            );
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                tracing::warn!(run_id, artifact, error = %e, "Failed to read artifact body");
                None
            }
        }
    }
}

fn classify_transport(operation: &'static str, err: reqwest::Error) -> RunnerError {
    if err.is_builder() {
        return RunnerError::Config(format!("Invalid request for '{}': {}", operation, err));
    }
    RunnerError::Transient {
        operation,
        reason: err.to_string(),
    }
}

fn is_invalid_credential(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.status.user_message)
        .is_some_and(|msg| msg == INVALID_TOKEN_MESSAGE)
}

fn parse_data<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| RunnerError::Protocol {
            operation,
            reason: e.to_string(),
        })
}
