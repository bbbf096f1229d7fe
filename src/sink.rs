// ABOUTME: Result sink for trigger/status records and downloaded artifacts
// ABOUTME: Filesystem implementation writes CSV tables and artifact files, replacing on every write

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, RunnerError};

pub const TRIGGER_TABLE: &str = "trigger";
pub const STATUS_TABLE: &str = "job_status";

/// Flat key/value row, columns in insertion order.
pub type Record = Vec<(String, String)>;

/// Where the orchestrator hands its results. Implementations own all path
/// handling; callers only name things.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Replace the named table with a single row.
    async fn write_record(&self, table: &str, row: &Record) -> Result<()>;

    /// Replace the named artifact with `content`.
    async fn store(&self, name: &str, content: &[u8]) -> Result<()>;
}

/// Writes `<root>/tables/<table>.csv` and `<root>/artifacts/<name>`.
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{}.csv", table))
    }

    pub fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(RunnerError::Sink(format!(
                "Refusing to store artifact with unsafe name '{}'",
                name
            )));
        }
        Ok(self.root.join("artifacts").join(relative))
    }
}

#[async_trait]
impl ResultSink for FsSink {
    async fn write_record(&self, table: &str, row: &Record) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(row.iter().map(|(k, _)| k.as_str()))?;
        writer.write_record(row.iter().map(|(_, v)| v.as_str()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| RunnerError::Sink(e.to_string()))?;

        let path = self.table_path(table);
        write_replacing(&path, &bytes).await?;
        tracing::debug!(table, path = %path.display(), "Wrote record");
        Ok(())
    }

    async fn store(&self, name: &str, content: &[u8]) -> Result<()> {
        let path = self.artifact_path(name)?;
        write_replacing(&path, content).await?;
        tracing::debug!(
            artifact = name,
            path = %path.display(),
            bytes = content.len(),
            "Stored artifact"
        );
        Ok(())
    }
}

async fn write_replacing(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_write_record_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let sink = FsSink::new(dir.path());

        sink.write_record(TRIGGER_TABLE, &row(&[("id", "1"), ("href", "/runs/1")]))
            .await
            .unwrap();
        sink.write_record(TRIGGER_TABLE, &row(&[("id", "555"), ("href", "/runs/555")]))
            .await
            .unwrap();

        let written = std::fs::read_to_string(sink.table_path(TRIGGER_TABLE)).unwrap();
        assert_eq!(written, "id,href\n555,/runs/555\n");
    }

    #[tokio::test]
    async fn test_values_with_commas_are_quoted() {
        let dir = TempDir::new().unwrap();
        let sink = FsSink::new(dir.path());

        sink.write_record(STATUS_TABLE, &row(&[("id", "9"), ("cause", "a, b")]))
            .await
            .unwrap();

        let written = std::fs::read_to_string(sink.table_path(STATUS_TABLE)).unwrap();
        assert_eq!(written, "id,cause\n9,\"a, b\"\n");
    }

    #[tokio::test]
    async fn test_store_creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let sink = FsSink::new(dir.path());

        sink.store("compiled/models/orders.sql", b"select 1")
            .await
            .unwrap();

        let path = dir.path().join("artifacts/compiled/models/orders.sql");
        assert_eq!(std::fs::read(path).unwrap(), b"select 1");
    }

    #[tokio::test]
    async fn test_store_rejects_parent_traversal() {
        let dir = TempDir::new().unwrap();
        let sink = FsSink::new(dir.path());

        let err = sink.store("../escape.json", b"{}").await.unwrap_err();
        assert!(matches!(err, RunnerError::Sink(_)));
        assert!(!dir.path().join("escape.json").exists());
    }
}
