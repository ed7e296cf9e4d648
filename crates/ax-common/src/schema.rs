//! Schema versioning for persisted artifacts.
//!
//! Every persisted agent record, model definition, and telemetry row
//! carries this version. Loaders reject artifacts whose major version
//! differs.

/// Current on-disk schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Returns true when `found` is loadable by the current schema.
///
/// Compatibility rule: major versions must match exactly; minor and
/// patch may differ.
pub fn is_compatible(found: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    match (major(SCHEMA_VERSION), major(found)) {
        (Some(a), Some(b)) => a == b && !b.is_empty(),
        _ => false,
    }
}
