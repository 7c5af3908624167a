//! Append-only run history (`.zipcode/history.jsonl`).
//!
//! History is a product artifact: one JSON line per finished run, written
//! regardless of `RUST_LOG`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::intent::Intent;
use crate::core::plan::StepId;
use crate::core::status::RuntimeStatus;
use crate::core::types::StepOutcome;

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub prompt: String,
    pub status: RuntimeStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub intent: Option<Intent>,
    pub steps: Vec<StepOutcome>,
    /// Step that halted the run, when the halt is tied to a step.
    pub halted_at: Option<StepId>,
    pub reason: Option<String>,
}

/// Store for finished runs.
pub trait RunHistory: Send + Sync {
    fn append(&self, record: &RunRecord) -> Result<()>;
}

/// JSON-lines history file.
pub struct JsonlRunHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in append order. A missing file is an empty history.
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("parse {} line {}", self.path.display(), idx + 1))
            })
            .collect()
    }
}

impl RunHistory for JsonlRunHistory {
    fn append(&self, record: &RunRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create history dir {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record).context("serialize run record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        debug!(run_id = %record.run_id, status = %record.status, "run recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecutionResult;

    fn record(run_id: &str, status: RuntimeStatus) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            run_id: run_id.to_string(),
            prompt: "add a flag".to_string(),
            status,
            started_at: now,
            ended_at: now,
            intent: None,
            steps: vec![StepOutcome {
                step_id: 0,
                result: ExecutionResult::Succeeded,
            }],
            halted_at: None,
            reason: None,
        }
    }

    #[test]
    fn appends_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let history = JsonlRunHistory::new(temp.path().join(".zipcode/history.jsonl"));
        history
            .append(&record("run-a", RuntimeStatus::Succeeded))
            .expect("append");
        history
            .append(&record("run-b", RuntimeStatus::Failed))
            .expect("append");

        let records = history.read_all().expect("read");
        let ids: Vec<&str> = records.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["run-a", "run-b"]);
        assert_eq!(records[1].status, RuntimeStatus::Failed);
        assert_eq!(records[0].steps, record("x", RuntimeStatus::Idle).steps);
    }

    #[test]
    fn missing_file_is_empty_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let history = JsonlRunHistory::new(temp.path().join("history.jsonl"));
        assert!(history.read_all().expect("read").is_empty());
        assert!(!history.path().exists());
    }

    #[test]
    fn corrupt_line_names_its_position() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("history.jsonl");
        fs::write(&path, "{}\n").expect("write");
        let err = JsonlRunHistory::new(&path).read_all().unwrap_err();
        assert!(err.to_string().contains("line 1"), "{err}");
    }
}
