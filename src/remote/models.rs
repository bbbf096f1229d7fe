// ABOUTME: Data structures for dbt Cloud job runs and API response envelopes
// ABOUTME: Status codes are kept as opaque tags so undocumented values never break parsing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every dbt Cloud v2 response wraps its payload in this envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<EnvelopeStatus>,
    pub data: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeStatus {
    pub code: Option<u16>,
    pub is_success: Option<bool>,
    pub user_message: Option<String>,
    pub developer_message: Option<String>,
}

/// Error bodies only carry the status part of the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerRequest<'a> {
    pub cause: &'a str,
}

/// Remote lifecycle code of a run.
///
/// Codes: 1 queued, 2 starting, 3 running, 10 success, 20 error, 30 cancelled.
/// Numbering has gaps, so anything else is carried as `Unknown` and treated as
/// still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RunStatus {
    Queued,
    Starting,
    Running,
    Success,
    Error,
    Cancelled,
    Unknown(i64),
}

impl RunStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RunStatus::Queued,
            2 => RunStatus::Starting,
            3 => RunStatus::Running,
            10 => RunStatus::Success,
            20 => RunStatus::Error,
            30 => RunStatus::Cancelled,
            other => RunStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            RunStatus::Queued => 1,
            RunStatus::Starting => 2,
            RunStatus::Running => 3,
            RunStatus::Success => 10,
            RunStatus::Error => 20,
            RunStatus::Cancelled => 30,
            RunStatus::Unknown(code) => code,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Error | RunStatus::Cancelled
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Starting => "STARTING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Error => "ERROR",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<i64> for RunStatus {
    fn from(code: i64) -> Self {
        RunStatus::from_code(code)
    }
}

impl From<RunStatus> for i64 {
    fn from(status: RunStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// One remote execution of a job.
///
/// Fields the runner does not interpret are kept in `extra` so the final
/// status record can carry them through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRun {
    pub id: u64,
    #[serde(default)]
    pub href: String,
    pub status: RunStatus,
    #[serde(default)]
    pub run_steps: Option<Vec<RunStep>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRun {
    /// Flat key/value view of the run: identity first, then every scalar
    /// field the remote side sent, in key order.
    pub fn to_record(&self) -> Vec<(String, String)> {
        let mut row = vec![
            ("id".to_string(), self.id.to_string()),
            ("href".to_string(), self.href.clone()),
            ("status".to_string(), self.status.code().to_string()),
            ("status_name".to_string(), self.status.name().to_string()),
        ];

        let mut keys: Vec<&String> = self.extra.keys().collect();
        keys.sort();
        for key in keys {
            if row.iter().any(|(k, _)| k == key) {
                continue;
            }
            let value = match &self.extra[key] {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => continue,
            };
            row.push((key.clone(), value));
        }
        row
    }
}

/// Subset of a trigger response that is recorded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggeredRun {
    pub id: u64,
    #[serde(default)]
    pub href: String,
}

impl TriggeredRun {
    pub fn to_record(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.to_string()),
            ("href".to_string(), self.href.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunStep {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub logs: Option<String>,
}

impl RunStep {
    pub fn is_failed(&self) -> bool {
        RunStatus::from_code(self.status) == RunStatus::Error
    }

    pub fn status_name(&self) -> &'static str {
        RunStatus::from_code(self.status).name()
    }
}
