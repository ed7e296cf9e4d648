//! Axon configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for every tunable in the platform
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots for run telemetry

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use resolve::{load_settings, ConfigSource};
pub use settings::{
    AgentDefaults, InferenceKind, InferenceSettings, MemorySettings, PipelineMode,
    PipelineSettings, PlannerKind, PlanningSettings, PolicySettings, PopulationEntry,
    PrecisionSettings, SchedulerSettings, Settings, WorldSettings,
};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
