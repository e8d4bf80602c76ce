//! JSON-file backed store for single-host setups and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::KvStore;

#[derive(Debug, Clone)]
pub struct FileKvStore {
    path: PathBuf,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store file inside a state directory.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::unavailable(format!(
                "corrupt config store {}: {e}",
                self.path.display()
            ))
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::unavailable(format!("failed to encode config store: {e}")))?;
        // Readers see either the old or the new file, never a partial one.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, path: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(path))
    }

    fn set(&self, path: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(path.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let mut entries = self.load()?;
        if entries.remove(path).is_none() {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    fn list(&self, dir: &str) -> Result<Vec<(String, String)>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .load()?
            .into_iter()
            .filter_map(|(path, value)| {
                let key = path.strip_prefix(&prefix)?;
                (!key.contains('/')).then(|| (key.to_string(), value))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_value_is_distinct_from_absent() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::in_dir(temp.path());

        assert_eq!(store.get("/deis/platform/domain").unwrap(), None);
        store.set("/deis/platform/domain", "").unwrap();
        assert_eq!(
            store.get("/deis/platform/domain").unwrap(),
            Some(String::new())
        );
    }

    #[test]
    fn remove_reports_whether_key_existed() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::in_dir(temp.path());

        store.set("/deis/router/bodySize", "1m").unwrap();
        assert!(store.remove("/deis/router/bodySize").unwrap());
        assert!(!store.remove("/deis/router/bodySize").unwrap());
    }

    #[test]
    fn list_returns_direct_children_only() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::in_dir(temp.path());

        store.set("/deis/platform/domain", "example.com").unwrap();
        store.set("/deis/platform/version", "1").unwrap();
        store.set("/deis/platformx/other", "x").unwrap();
        store.set("/deis/router/hosts", "a,b").unwrap();

        assert_eq!(
            store.list("/deis/platform").unwrap(),
            vec![
                ("domain".to_string(), "example.com".to_string()),
                ("version".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn corrupt_file_is_reported_as_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::in_dir(temp.path());
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.get("/deis/platform/domain").unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
