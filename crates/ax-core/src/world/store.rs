//! File-backed persistence store.
//!
//! One JSON document per agent under a base directory. Writes go
//! through a temp file plus rename so a crash mid-write never leaves a
//! truncated document. Schema versions are checked on load.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use ax_common::{schema, AgentId, Error, Result};

use crate::agent::PersistedAgent;
use crate::world::PersistenceStore;

/// Directory-of-JSON persistence backend.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(JsonStore {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: AgentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl PersistenceStore for JsonStore {
    fn save_agent(&mut self, snapshot: &PersistedAgent) -> Result<()> {
        let path = self.path_for(snapshot.record.id);
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        debug!(agent = %snapshot.record.id, path = %path.display(), "agent saved");
        Ok(())
    }

    fn load_agent(&self, id: AgentId) -> Result<PersistedAgent> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        let text = fs::read_to_string(&path)?;
        let snapshot: PersistedAgent = serde_json::from_str(&text)
            .map_err(|e| Error::Persistence(format!("{}: {e}", path.display())))?;
        if !schema::is_compatible(&snapshot.schema_version) {
            return Err(Error::SchemaMismatch {
                expected: ax_common::SCHEMA_VERSION.to_string(),
                actual: snapshot.schema_version,
            });
        }
        Ok(snapshot)
    }

    fn list_agents(&self) -> Result<Vec<AgentId>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let Some(raw) = stem.strip_prefix("agent-") else {
                continue;
            };
            if let Ok(value) = raw.parse::<u64>() {
                out.push(AgentId(value));
            }
        }
        out.sort();
        Ok(out)
    }

    fn delete_agent(&mut self, id: AgentId) -> Result<()> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{build_agent, AgentSpec, Position};
    use ax_config::Settings;

    fn snapshot(id: u64) -> PersistedAgent {
        let settings = Settings::default();
        let spec = AgentSpec {
            name: format!("agent-{id}"),
            preset: "generic".into(),
            position: Position::default(),
            model: None,
        };
        build_agent(&spec, &settings, AgentId(id)).unwrap().persist()
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        let snap = snapshot(1);
        store.save_agent(&snap).unwrap();
        let loaded = store.load_agent(AgentId(1)).unwrap();
        assert_eq!(loaded.record, snap.record);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        for id in [3, 1, 2] {
            store.save_agent(&snapshot(id)).unwrap();
        }
        let ids = store.list_agents().unwrap();
        assert_eq!(ids, vec![AgentId(1), AgentId(2), AgentId(3)]);
    }

    #[test]
    fn missing_agent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_agent(AgentId(9)),
            Err(Error::AgentNotFound(_))
        ));
    }

    #[test]
    fn incompatible_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        let mut snap = snapshot(1);
        snap.schema_version = "7.0.0".into();
        store.save_agent(&snap).unwrap();
        assert!(matches!(
            store.load_agent(AgentId(1)),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn delete_removes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        store.save_agent(&snapshot(1)).unwrap();
        store.delete_agent(AgentId(1)).unwrap();
        assert!(store.list_agents().unwrap().is_empty());
        assert!(store.delete_agent(AgentId(1)).is_err());
    }
}
