//! Trace retention policy enforcement.
//!
//! Enforces a TTL and a disk budget over the trace directory. No
//! silent deletions: every pruned file is reported as a
//! [`RetentionEvent`], and a dry-run preview is available.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from retention operations.
#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace directory does not exist: {0}")]
    MissingDir(String),
}

/// Retention policy for the trace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum trace age in days.
    pub max_age_days: u64,
    /// Total disk budget in bytes across all traces.
    pub max_total_bytes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            max_age_days: 14,
            max_total_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Why a file was (or would be) pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    Expired,
    OverBudget,
}

/// One pruning action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionEvent {
    pub file: PathBuf,
    pub bytes: u64,
    pub reason: PruneReason,
}

/// Enforces retention over one trace directory.
pub struct RetentionEnforcer {
    dir: PathBuf,
    config: RetentionConfig,
}

impl RetentionEnforcer {
    pub fn new(dir: PathBuf, config: RetentionConfig) -> Self {
        RetentionEnforcer { dir, config }
    }

    /// Compute the pruning plan without deleting anything.
    pub fn preview(&self) -> Result<Vec<RetentionEvent>, RetentionError> {
        let mut files = self.scan()?;
        let mut plan = Vec::new();
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.config.max_age_days * 86_400));

        // Oldest first so the budget pass trims from the tail of history.
        files.sort_by_key(|f| f.modified);

        let mut total: u64 = files.iter().map(|f| f.bytes).sum();
        for f in &files {
            if let Some(cutoff) = cutoff {
                if f.modified < cutoff {
                    plan.push(RetentionEvent {
                        file: f.path.clone(),
                        bytes: f.bytes,
                        reason: PruneReason::Expired,
                    });
                    total -= f.bytes;
                    continue;
                }
            }
            if total > self.config.max_total_bytes {
                plan.push(RetentionEvent {
                    file: f.path.clone(),
                    bytes: f.bytes,
                    reason: PruneReason::OverBudget,
                });
                total -= f.bytes;
            }
        }
        Ok(plan)
    }

    /// Enforce the policy, deleting files and reporting every deletion.
    pub fn enforce(&self) -> Result<Vec<RetentionEvent>, RetentionError> {
        let plan = self.preview()?;
        for event in &plan {
            fs::remove_file(&event.file)?;
            info!(file = %event.file.display(), bytes = event.bytes, reason = ?event.reason, "pruned trace file");
        }
        Ok(plan)
    }

    fn scan(&self) -> Result<Vec<TraceFile>, RetentionError> {
        if !self.dir.is_dir() {
            return Err(RetentionError::MissingDir(
                self.dir.display().to_string(),
            ));
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let meta = entry.metadata()?;
            files.push(TraceFile {
                path,
                bytes: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(files)
    }
}

struct TraceFile {
    path: PathBuf,
    bytes: u64,
    modified: SystemTime,
}

/// Convenience: enforce retention, tolerating a missing directory.
pub fn enforce_default(dir: &Path) -> Result<Vec<RetentionEvent>, RetentionError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    RetentionEnforcer::new(dir.to_path_buf(), RetentionConfig::default()).enforce()
}
