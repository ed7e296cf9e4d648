//! Progress event emission.
//!
//! Lightweight structured events for CLI and agent-driven consumers,
//! dispatched through an in-process fan-out that supports multiple
//! subscribers and a JSONL sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Standard event names.
pub mod event_names {
    pub const RUN_STARTED: &str = "run_started";
    pub const RUN_STOPPED: &str = "run_stopped";

    pub const TICK_STARTED: &str = "tick_started";
    pub const TICK_COMPLETE: &str = "tick_complete";

    pub const AGENT_UPDATED: &str = "agent_updated";
    pub const AGENT_ERROR: &str = "agent_error";
    pub const AGENT_TIMEOUT: &str = "agent_timeout";

    pub const ACTION_APPLIED: &str = "action_applied";
    pub const MESSAGES_DELIVERED: &str = "messages_delivered";
}

/// High-level phase of the tick pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Run,
    Snapshot,
    Update,
    Apply,
    Deliver,
}

/// Structured progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl ProgressEvent {
    pub fn new(event: &str, phase: Phase) -> Self {
        ProgressEvent {
            event: event.to_string(),
            timestamp: Utc::now(),
            phase,
            tick: None,
            agent: None,
            details: HashMap::new(),
        }
    }

    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn with_agent(mut self, agent: impl std::fmt::Display) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Event consumer.
pub trait EventSink: Send {
    fn emit(&mut self, event: &ProgressEvent);
}

/// Fan-out to any number of sinks.
#[derive(Default)]
pub struct FanoutEmitter {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        for sink in &mut self.sinks {
            sink.emit(&event);
        }
    }
}

/// JSONL sink over any writer.
pub struct JsonlSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(out: W) -> Self {
        JsonlSink { out }
    }
}

impl<W: Write + Send> EventSink for JsonlSink<W> {
    fn emit(&mut self, event: &ProgressEvent) {
        if serde_json::to_writer(&mut self.out, event).is_ok() {
            let _ = self.out.write_all(b"\n");
        }
    }
}

/// Collecting sink for tests and introspection.
#[derive(Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("sink lock").clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, event: &ProgressEvent) {
        self.events.lock().expect("sink lock").push(event.clone());
    }
}
