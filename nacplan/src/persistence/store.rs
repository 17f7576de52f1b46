//! Keyed storage for saved configurations.

use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{CircuitConfiguration, ConfigurationError};

/// A repository of configurations keyed by id.
pub trait ConfigurationStore {
    /// Insert or replace a configuration
    fn put(&mut self, config: &CircuitConfiguration) -> Result<(), ConfigurationError>;

    fn get(&self, id: Uuid) -> Result<Option<CircuitConfiguration>, ConfigurationError>;

    /// All configurations, most recently modified first
    fn list(&self) -> Result<Vec<CircuitConfiguration>, ConfigurationError>;

    /// Returns false when nothing was stored under `id`
    fn remove(&mut self, id: Uuid) -> Result<bool, ConfigurationError>;
}

/// One `<id>.json` file per configuration in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirectoryStore {
    dir: PathBuf,
}

impl JsonDirectoryStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: &Path) -> Result<Self, ConfigurationError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ConfigurationStore for JsonDirectoryStore {
    fn put(&mut self, config: &CircuitConfiguration) -> Result<(), ConfigurationError> {
        let json = config.to_json()?;
        let path = self.path_for(config.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!("Stored configuration '{}' at {:?}", config.name, path);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<CircuitConfiguration>, ConfigurationError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        CircuitConfiguration::from_json(&json).map(Some)
    }

    fn list(&self) -> Result<Vec<CircuitConfiguration>, ConfigurationError> {
        let mut configs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(ConfigurationError::from)
                .and_then(|json| CircuitConfiguration::from_json(&json));
            match parsed {
                Ok(config) => configs.push(config),
                Err(e) => tracing::warn!("Skipping unreadable configuration {:?}: {}", path, e),
            }
        }
        configs.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(configs)
    }

    fn remove(&mut self, id: Uuid) -> Result<bool, ConfigurationError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{CircuitManager, DeviceRecord};
    use chrono::Duration;
    use tempfile::TempDir;

    fn config(name: &str) -> CircuitConfiguration {
        let mut manager = CircuitManager::default();
        manager
            .add_device_to_main(DeviceRecord::new("D1", "Strobe", 0.1, 0.0), 20.0)
            .unwrap();
        manager.save(name, "")
    }

    #[test]
    fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonDirectoryStore::open(&dir.path().join("designs")).unwrap();

        let saved = config("Level 1");
        store.put(&saved).unwrap();
        assert_eq!(store.get(saved.id).unwrap(), Some(saved.clone()));
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());

        assert!(store.remove(saved.id).unwrap());
        assert!(!store.remove(saved.id).unwrap());
        assert!(store.get(saved.id).unwrap().is_none());
    }

    #[test]
    fn test_list_sorted_by_modified_date() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonDirectoryStore::open(dir.path()).unwrap();

        let mut older = config("older");
        older.modified_at = older.modified_at - Duration::hours(2);
        let newer = config("newer");
        store.put(&older).unwrap();
        store.put(&newer).unwrap();
        std::fs::write(dir.path().join("junk.json"), "not a configuration").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }
}
