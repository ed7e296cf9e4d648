//! Agent and run identity types.
//!
//! Agent ids are assigned sequentially by the factory and order the
//! scheduler's update and action-application phases. Sequential ids keep
//! the ordering stable across runs with the same seed, which is what makes
//! action traces reproducible.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque agent identifier.
///
/// Ids are dense, factory-assigned, and totally ordered. The scheduler
/// relies on `Ord` to visit agents and apply their actions in a
/// deterministic order within every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl AgentId {
    /// Raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{:06}", self.0)
    }
}

impl From<u64> for AgentId {
    fn from(raw: u64) -> Self {
        AgentId(raw)
    }
}

/// Run identifier for correlating logs, telemetry, and persisted state.
///
/// Unlike [`AgentId`], run ids are random; they never participate in
/// scheduling order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh run id.
    pub fn generate() -> Self {
        RunId(format!("run-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Parse and validate a run id string.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("run-")?;
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(RunId(s.to_string()))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_display_is_zero_padded() {
        assert_eq!(AgentId(7).to_string(), "agent-000007");
    }

    #[test]
    fn agent_id_ordering_follows_value() {
        let mut ids = vec![AgentId(3), AgentId(1), AgentId(2)];
        ids.sort();
        assert_eq!(ids, vec![AgentId(1), AgentId(2), AgentId(3)]);
    }

    #[test]
    fn run_id_round_trips() {
        let id = RunId::generate();
        assert_eq!(RunId::parse(&id.0), Some(id));
    }

    #[test]
    fn run_id_rejects_malformed() {
        assert!(RunId::parse("run-xyz").is_none());
        assert!(RunId::parse("nope").is_none());
    }
}
