// ABOUTME: Error taxonomy for the dbt Cloud job runner
// ABOUTME: Separates user-facing failures from defects and marks which errors can be retried

use std::time::Duration;

use thiserror::Error;

use crate::remote::models::RunStep;

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Longest step log excerpt included in a job failure message.
const MAX_STEP_LOG_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Invalid API key has been set, job could not be triggered. \
         Make sure the API key is valid and re-enter it into the configuration"
    )]
    Auth,

    #[error("Remote request '{operation}' failed with status {status}: {body}")]
    RemoteRequest {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Transient failure during '{operation}': {reason}")]
    Transient {
        operation: &'static str,
        reason: String,
    },

    #[error("Unexpected response to '{operation}': {reason}")]
    Protocol {
        operation: &'static str,
        reason: String,
    },

    #[error("Job run {run_id} failed{}", format_steps(.steps))]
    JobFailed { run_id: u64, steps: Vec<RunStep> },

    #[error("Job run {run_id} has been cancelled")]
    JobCancelled { run_id: u64 },

    #[error(
        "Max wait time reached for job run {run_id} after {}s. \
         The run may still be executing remotely",
        .waited.as_secs()
    )]
    TimeoutExceeded { run_id: u64, waited: Duration },

    #[error("Failed to persist results: {0}")]
    Sink(String),
}

impl RunnerError {
    /// Whether the failure is something the user can act on (bad config, job
    /// outcome, remote rejection) as opposed to a defect or local fault.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, RunnerError::Protocol { .. } | RunnerError::Sink(_))
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RunnerError::Transient { .. })
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Sink(err.to_string())
    }
}

impl From<csv::Error> for RunnerError {
    fn from(err: csv::Error) -> Self {
        RunnerError::Sink(err.to_string())
    }
}

fn format_steps(steps: &[RunStep]) -> String {
    let failed: Vec<&RunStep> = steps.iter().filter(|s| s.is_failed()).collect();
    let shown = if failed.is_empty() { steps.iter().collect() } else { failed };
    if shown.is_empty() {
        return String::new();
    }

    let mut out = String::from(". Step details:");
    for step in shown {
        out.push_str(&format!(
            "\n  [{}] {} ({})",
            step.index,
            step.name,
            step.status_name()
        ));
        if let Some(logs) = step.logs.as_deref().filter(|l| !l.is_empty()) {
            out.push('\n');
            out.push_str(&tail_chars(logs, MAX_STEP_LOG_CHARS));
        }
    }
    out
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: u32, name: &str, status: i64, logs: Option<&str>) -> RunStep {
        RunStep {
            index,
            name: name.to_string(),
            status,
            logs: logs.map(str::to_string),
        }
    }

    #[test]
    fn test_job_failed_message_lists_failed_steps_only() {
        let err = RunnerError::JobFailed {
            run_id: 42,
            steps: vec![
                step(1, "Clone repository", 10, None),
                step(2, "Invoke dbt run", 20, Some("Compilation Error in model orders")),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Job run 42 failed"));
        assert!(msg.contains("Invoke dbt run"));
        assert!(msg.contains("Compilation Error in model orders"));
        assert!(!msg.contains("Clone repository"));
    }

    #[test]
    fn test_job_failed_without_steps() {
        let err = RunnerError::JobFailed {
            run_id: 7,
            steps: vec![],
        };
        assert_eq!(err.to_string(), "Job run 7 failed");
    }

    #[test]
    fn test_long_logs_are_truncated_from_the_front() {
        let logs = "x".repeat(MAX_STEP_LOG_CHARS + 50) + "END";
        let out = tail_chars(&logs, MAX_STEP_LOG_CHARS);
        assert!(out.starts_with("..."));
        assert!(out.ends_with("END"));
        assert_eq!(out.chars().count(), MAX_STEP_LOG_CHARS + 3);
    }

    #[test]
    fn test_user_facing_classification() {
        assert!(RunnerError::Config("missing".into()).is_user_facing());
        assert!(RunnerError::Auth.is_user_facing());
        assert!(RunnerError::JobCancelled { run_id: 1 }.is_user_facing());
        assert!(!RunnerError::Sink("disk full".into()).is_user_facing());
        assert!(!RunnerError::Protocol {
            operation: "trigger",
            reason: "missing data".into()
        }
        .is_user_facing());
    }

    #[test]
    fn test_timeout_message_mentions_run() {
        let err = RunnerError::TimeoutExceeded {
            run_id: 99,
            waited: Duration::from_secs(600),
        };
        let msg = err.to_string();
        assert!(msg.contains("99"));
        assert!(msg.contains("600s"));
    }
}
