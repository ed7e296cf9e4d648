//! Buffered JSONL trace writer.
//!
//! Rows are buffered in memory and appended to one file per run.
//! Flushing is explicit at tick boundaries (the scheduler flushes after
//! applying actions) plus automatic once the buffer reaches the batch
//! size, so a crash loses at most one buffer of rows.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::schema::TraceRecord;

/// Errors from trace writer operations.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Configuration for the trace writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory for trace files.
    pub base_dir: PathBuf,
    /// Rows buffered before an automatic flush.
    pub batch_size: usize,
    /// Run id used for file naming.
    pub run_id: String,
}

impl WriterConfig {
    /// Create config with defaults.
    pub fn new(base_dir: PathBuf, run_id: String) -> Self {
        WriterConfig {
            base_dir,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            run_id,
        }
    }
}

/// Append-only JSONL writer for one run's trace.
pub struct TraceWriter {
    config: WriterConfig,
    path: PathBuf,
    out: BufWriter<File>,
    buffered: usize,
    rows_written: u64,
}

impl TraceWriter {
    /// Open (creating directories as needed) the trace file for this run.
    pub fn open(config: WriterConfig) -> Result<Self, WriteError> {
        if config.run_id.is_empty() || config.run_id.contains(std::path::MAIN_SEPARATOR) {
            return Err(WriteError::InvalidPath(format!(
                "run id `{}` is not a valid file stem",
                config.run_id
            )));
        }
        fs::create_dir_all(&config.base_dir)?;
        let path = config.base_dir.join(format!("{}.jsonl", config.run_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(TraceWriter {
            config,
            path,
            out: BufWriter::new(file),
            buffered: 0,
            rows_written: 0,
        })
    }

    /// Queue one record; flushes automatically at the batch size.
    pub fn append(&mut self, record: &TraceRecord) -> Result<(), WriteError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.buffered += 1;
        self.rows_written += 1;
        if self.buffered >= self.config.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Force buffered rows to disk.
    pub fn flush(&mut self) -> Result<(), WriteError> {
        if self.buffered > 0 {
            debug!(rows = self.buffered, path = %self.path.display(), "flushing trace buffer");
        }
        self.out.flush()?;
        self.buffered = 0;
        Ok(())
    }

    /// Total rows appended through this writer.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Path of the trace file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TickRecord, TracePayload};

    fn tick_record(tick: u64) -> TraceRecord {
        TraceRecord::new(
            "run-test",
            TracePayload::Tick(TickRecord {
                tick,
                elapsed_ms: 1,
                agents_updated: 1,
                actions_applied: 1,
                messages_delivered: 0,
                errors: 0,
            }),
        )
    }

    #[test]
    fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = WriterConfig::new(dir.path().to_path_buf(), "run-test".into());
        let mut writer = TraceWriter::open(config).unwrap();
        for t in 0..5 {
            writer.append(&tick_record(t)).unwrap();
        }
        writer.flush().unwrap();

        let text = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(text.lines().count(), 5);
        let first: TraceRecord = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(matches!(first.payload, TracePayload::Tick(ref t) if t.tick == 0));
    }

    #[test]
    fn append_mode_preserves_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = WriterConfig::new(dir.path().to_path_buf(), "run-test".into());
        {
            let mut writer = TraceWriter::open(config.clone()).unwrap();
            writer.append(&tick_record(0)).unwrap();
        }
        {
            let mut writer = TraceWriter::open(config).unwrap();
            writer.append(&tick_record(1)).unwrap();
        }
        let path = dir.path().join("run-test.jsonl");
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn rejects_pathy_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = WriterConfig::new(dir.path().to_path_buf(), "../escape".into());
        assert!(matches!(
            TraceWriter::open(config),
            Err(WriteError::InvalidPath(_))
        ));
    }
}
