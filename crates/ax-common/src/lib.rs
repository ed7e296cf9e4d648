//! Axon common types, IDs, and errors.
//!
//! This crate provides foundational types shared across ax-core modules:
//! - Agent and run identity types with stable ordering guarantees
//! - Common error types with stable codes and categories
//! - Output format specifications
//! - Schema versioning for persisted artifacts

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, ErrorCategory, Result};
pub use id::{AgentId, RunId};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
