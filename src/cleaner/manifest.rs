use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::result::{ResultTree, RunStatus};

/// One line of the daily run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Timestamp-based identifier
    pub run_id: String,

    pub timestamp: DateTime<Utc>,

    /// Full result tree of the run
    pub tree: ResultTree,
}

/// Compact view of a logged run (for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub status: RunStatus,
    pub ides_total: usize,
    pub ides_succeeded: usize,
    pub message: String,
}

impl RunManifest {
    pub fn new(tree: &ResultTree) -> Self {
        let now = Utc::now();
        Self {
            run_id: now.format("%Y-%m-%dT%H-%M-%S%.3f").to_string(),
            timestamp: now,
            tree: tree.clone(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            timestamp: self.timestamp,
            operation: self.tree.operation.clone(),
            status: self.tree.status,
            ides_total: self.tree.ides.len(),
            ides_succeeded: self.tree.succeeded_count(),
            message: self.tree.message.clone(),
        }
    }

    fn log_path(log_dir: &Path, timestamp: &DateTime<Utc>) -> PathBuf {
        log_dir.join(format!("runs-{}.jsonl", timestamp.format("%Y-%m-%d")))
    }

    /// Append to the daily log file (JSONL format)
    pub fn append(&self, log_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create logs dir: {}", log_dir.display()))?;

        let log_path = Self::log_path(log_dir, &self.timestamp);
        let entry = serde_json::to_string(self).context("Failed to serialize run entry")?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log: {}", log_path.display()))?;
        writeln!(file, "{}", entry)?;

        Ok(log_path)
    }

    /// Most recent runs first, at most `limit`
    pub fn recent(log_dir: &Path, limit: usize) -> Result<Vec<RunSummary>> {
        if !log_dir.exists() {
            return Ok(Vec::new());
        }

        let mut logs: Vec<PathBuf> = std::fs::read_dir(log_dir)
            .with_context(|| format!("Failed to read logs dir: {}", log_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("runs-") && n.ends_with(".jsonl"))
            })
            .collect();
        logs.sort();

        let mut runs = Vec::new();
        for log in logs.iter().rev() {
            let contents = std::fs::read_to_string(log)
                .with_context(|| format!("Failed to read log: {}", log.display()))?;
            let mut day: Vec<RunSummary> = contents
                .lines()
                .filter_map(|line| serde_json::from_str::<RunManifest>(line).ok())
                .map(|m| m.summary())
                .collect();
            day.reverse();
            runs.extend(day);
            if runs.len() >= limit {
                break;
            }
        }

        runs.truncate(limit);
        Ok(runs)
    }
}
