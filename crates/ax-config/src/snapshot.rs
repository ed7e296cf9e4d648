//! Config snapshots for run telemetry.
//!
//! A snapshot freezes the fully resolved settings at run start so the
//! telemetry trail records exactly what the run executed with, not what
//! the files on disk later said.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolve::ConfigSource;
use crate::settings::Settings;
use crate::CONFIG_SCHEMA_VERSION;

/// Frozen, fully resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub schema_version: String,
    /// Where the document came from, for diagnostics.
    pub source: String,
    pub captured_at: DateTime<Utc>,
    pub settings: Settings,
}

impl ConfigSnapshot {
    /// Capture the resolved settings.
    pub fn capture(settings: &Settings, source: &ConfigSource) -> Self {
        ConfigSnapshot {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            source: source.to_string(),
            captured_at: Utc::now(),
            settings: settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_json() {
        let snap = ConfigSnapshot::capture(&Settings::default(), &ConfigSource::BuiltinDefault);
        let text = serde_json::to_string(&snap).unwrap();
        let back: ConfigSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back.settings, snap.settings);
        assert_eq!(back.schema_version, CONFIG_SCHEMA_VERSION);
    }
}
