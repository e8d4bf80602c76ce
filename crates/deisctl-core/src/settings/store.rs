//! Loading and saving deisctl.toml.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::{Settings, parser};

pub const SETTINGS_FILE: &str = "deisctl.toml";

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/deisctl/deisctl.toml`.
    pub fn from_default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or_else(|| Error::Settings("could not determine config directory".to_string()))?;
        Ok(Self::new(dir.join("deisctl").join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }
        parser::parse_settings(&self.path)
    }
}

/// Default state directory: `<state dir>/deisctl`, falling back to the local data dir.
pub fn default_state_dir() -> Result<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("deisctl"))
        .ok_or_else(|| Error::Settings("could not determine state directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::new(temp.path().join("nope.toml"));
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn existing_file_is_parsed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::write(&path, "backend = \"local\"\nunits_dir = \"/opt/units\"\n").unwrap();

        let settings = SettingsStore::new(&path).load().unwrap();
        assert_eq!(settings.backend, BackendKind::Local);
        assert_eq!(settings.units_dir, Some(PathBuf::from("/opt/units")));
    }
}
