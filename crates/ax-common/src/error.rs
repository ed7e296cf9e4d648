//! Error types for Axon.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints so the scheduler can decide whether to
//!   isolate an agent or continue
//!
//! Numerical kernels return these errors through typed `Result`s; the
//! per-agent update catches them and either recovers locally
//! (degenerate observations, exhausted budgets, exhausted resources) or
//! escalates the agent into `error` status (invariant violations,
//! invalid state transitions). The scheduler never aborts the whole run
//! on a single-agent failure.
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 30,
//!   "category": "inference",
//!   "message": "degenerate observation: zero-probability event for modality 2",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Axon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file and settings errors.
    Config,
    /// Generative-model storage and invariant errors.
    Model,
    /// Variational inference and numerical errors.
    Inference,
    /// Policy scoring and temporal planning errors.
    Planning,
    /// Agent state-machine and resource errors.
    Agent,
    /// World, messaging, and other collaborator errors.
    World,
    /// Persistence and serialization errors.
    Persistence,
    /// File I/O errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Inference => write!(f, "inference"),
            ErrorCategory::Planning => write!(f, "planning"),
            ErrorCategory::Agent => write!(f, "agent"),
            ErrorCategory::World => write!(f, "world"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Axon.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: String, reason: String },

    // Model errors (20-29)
    #[error("invariant violation in {tensor}: {reason}")]
    InvariantViolation { tensor: String, reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("model definition parse error at line {line}, column {column}: {reason}")]
    Parse {
        line: usize,
        column: usize,
        reason: String,
    },

    // Inference errors (30-39)
    #[error("degenerate observation: {0}")]
    DegenerateObservation(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Planning errors (40-49)
    #[error("budget exceeded in {phase}: {spent} of {limit}")]
    BudgetExceeded {
        phase: String,
        spent: String,
        limit: String,
    },

    #[error("planner has no candidate policies")]
    NoCandidatePolicies,

    // Agent errors (50-59)
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("resource exhausted: {resource} ({available} available, {required} required)")]
    ResourceExhausted {
        resource: String,
        available: f64,
        required: f64,
    },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    // World / collaborator errors (60-69)
    #[error("external collaborator failure in {collaborator}: {reason}")]
    External { collaborator: String, reason: String },

    // Persistence errors (70-79)
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors (80-89)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Model errors
    /// - 30-39: Inference errors
    /// - 40-49: Planning errors
    /// - 50-59: Agent errors
    /// - 60-69: World/collaborator errors
    /// - 70-79: Persistence errors
    /// - 80-89: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidSetting { .. } => 11,
            Error::InvariantViolation { .. } => 20,
            Error::DimensionMismatch { .. } => 21,
            Error::Parse { .. } => 22,
            Error::DegenerateObservation(_) => 30,
            Error::NumericalInstability(_) => 31,
            Error::BudgetExceeded { .. } => 40,
            Error::NoCandidatePolicies => 41,
            Error::InvalidTransition { .. } => 50,
            Error::ResourceExhausted { .. } => 51,
            Error::AgentNotFound(_) => 52,
            Error::External { .. } => 60,
            Error::Persistence(_) => 70,
            Error::SchemaMismatch { .. } => 71,
            Error::Json(_) => 72,
            Error::Io(_) => 80,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidSetting { .. } => ErrorCategory::Config,

            Error::InvariantViolation { .. }
            | Error::DimensionMismatch { .. }
            | Error::Parse { .. } => ErrorCategory::Model,

            Error::DegenerateObservation(_) | Error::NumericalInstability(_) => {
                ErrorCategory::Inference
            }

            Error::BudgetExceeded { .. } | Error::NoCandidatePolicies => ErrorCategory::Planning,

            Error::InvalidTransition { .. }
            | Error::ResourceExhausted { .. }
            | Error::AgentNotFound(_) => ErrorCategory::Agent,

            Error::External { .. } => ErrorCategory::World,

            Error::Persistence(_) | Error::SchemaMismatch { .. } | Error::Json(_) => {
                ErrorCategory::Persistence
            }

            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is recoverable within the same tick.
    ///
    /// Recoverable errors are handled locally by the per-agent update
    /// (fall back to uniform belief, accept a best-effort plan,
    /// substitute a cheaper action). Unrecoverable errors force the
    /// agent into `error` status.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Config errors surface at load time; nothing to recover mid-run
            Error::Config(_) => false,
            Error::InvalidSetting { .. } => false,

            // Invariant breaks are never silently fixed
            Error::InvariantViolation { .. } => false,
            Error::DimensionMismatch { .. } => false,
            Error::Parse { .. } => false,

            // Inference degeneracy falls back to the uniform prior
            Error::DegenerateObservation(_) => true,
            Error::NumericalInstability(_) => true,

            // Best-effort results are still usable
            Error::BudgetExceeded { .. } => true,
            Error::NoCandidatePolicies => true,

            Error::InvalidTransition { .. } => false,
            // Substituted with a cheaper action
            Error::ResourceExhausted { .. } => true,
            Error::AgentNotFound(_) => false,

            // Collaborator failures: agent continues, caller is informed
            Error::External { .. } => true,

            Error::Persistence(_) => true,
            Error::SchemaMismatch { .. } => false,
            Error::Json(_) => true,

            Error::Io(_) => true,
        }
    }

    /// Serialize to the stable agent-facing JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "category": self.category(),
            "message": self.to_string(),
            "recoverable": self.is_recoverable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_category_ranges() {
        let cases: Vec<(Error, u32, ErrorCategory)> = vec![
            (Error::Config("x".into()), 10, ErrorCategory::Config),
            (
                Error::InvariantViolation {
                    tensor: "A".into(),
                    reason: "column 2 sums to 0.9".into(),
                },
                20,
                ErrorCategory::Model,
            ),
            (
                Error::DegenerateObservation("zero-probability".into()),
                30,
                ErrorCategory::Inference,
            ),
            (
                Error::BudgetExceeded {
                    phase: "mcts".into(),
                    spent: "100 sims".into(),
                    limit: "100 sims".into(),
                },
                40,
                ErrorCategory::Planning,
            ),
            (
                Error::InvalidTransition {
                    from: "offline".into(),
                    to: "moving".into(),
                },
                50,
                ErrorCategory::Agent,
            ),
        ];
        for (err, code, category) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.category(), category);
        }
    }

    #[test]
    fn invariant_violation_is_fatal() {
        let err = Error::InvariantViolation {
            tensor: "B[:,:,1]".into(),
            reason: "negative entry".into(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn degenerate_observation_recovers() {
        assert!(Error::DegenerateObservation("all-zero likelihood".into()).is_recoverable());
    }

    #[test]
    fn json_shape_is_stable() {
        let err = Error::DegenerateObservation("x".into());
        let v = err.to_json();
        assert_eq!(v["code"], 30);
        assert_eq!(v["category"], "inference");
        assert_eq!(v["recoverable"], true);
    }

    #[test]
    fn parse_error_carries_location() {
        let err = Error::Parse {
            line: 5,
            column: 12,
            reason: "expected number".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 5"));
        assert!(msg.contains("column 12"));
    }
}
