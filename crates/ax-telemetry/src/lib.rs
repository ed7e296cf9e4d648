//! Axon telemetry storage.
//!
//! This crate provides:
//! - Record schemas for tick, action, and event traces
//! - A buffered JSONL writer with explicit flushing
//! - Retention enforcement over the trace directory

pub mod retention;
pub mod schema;
pub mod writer;

pub use retention::{RetentionConfig, RetentionEnforcer, RetentionEvent};
pub use schema::{ActionRecord, EventRecord, TickRecord, TraceRecord};
pub use writer::{TraceWriter, WriteError, WriterConfig};

/// Schema version for trace records.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default rows buffered before an automatic flush.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default trace directory under the platform data dir.
pub fn default_trace_dir() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|d| d.join("axon").join("traces"))
}
