//! Trace record schemas.
//!
//! Three record kinds share one JSONL stream, discriminated by a
//! `kind` tag. Every record carries the schema version and the run id
//! so traces from different runs can be merged and still audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ax_common::AgentId;

/// Per-tick summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: u64,
    /// Wall time the tick took, milliseconds.
    pub elapsed_ms: u64,
    pub agents_updated: usize,
    pub actions_applied: usize,
    pub messages_delivered: usize,
    pub errors: usize,
}

/// One applied action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tick: u64,
    pub agent: AgentId,
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// An error or warning surfaced during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    pub code: u32,
    pub category: String,
    pub message: String,
    pub recoverable: bool,
}

/// Envelope written to the JSONL stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TracePayload {
    Tick(TickRecord),
    Action(ActionRecord),
    Event(EventRecord),
}

/// A complete trace row: envelope plus correlation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub schema_version: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: TracePayload,
}

impl TraceRecord {
    /// Wrap a payload with the current schema version and timestamp.
    pub fn new(run_id: &str, payload: TracePayload) -> Self {
        TraceRecord {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_record_round_trips() {
        let rec = TraceRecord::new(
            "run-abc",
            TracePayload::Tick(TickRecord {
                tick: 3,
                elapsed_ms: 12,
                agents_updated: 5,
                actions_applied: 5,
                messages_delivered: 2,
                errors: 0,
            }),
        );
        let line = serde_json::to_string(&rec).unwrap();
        let back: TraceRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn kind_tag_discriminates() {
        let rec = TraceRecord::new(
            "run-abc",
            TracePayload::Action(ActionRecord {
                tick: 1,
                agent: AgentId(4),
                action: "move_north".into(),
                success: true,
                failure_reason: None,
            }),
        );
        let v: serde_json::Value = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["kind"], "action");
        assert_eq!(v["agent"], 4);
    }
}
