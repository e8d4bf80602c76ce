//! Startup wiring: settings in, backend and KV store out.
//!
//! [`DispatchContext`] is the one place that knows which concrete backend and
//! store the settings select. Everything downstream works on trait objects.

use std::path::{Path, PathBuf};

use crate::backend::{Backend, BackendKind, FleetBackend, LocalBackend};
use crate::error::{Error, Result};
use crate::kv::{EtcdctlStore, FileKvStore, Keyspace, KvStore};
use crate::settings::{KvKind, Settings, SettingsStore, default_state_dir};
use crate::units::{UNITS_ENV, UnitSearchPath, default_user_units_dir};

use super::Dispatcher;

#[derive(Debug, Clone)]
pub struct DispatchContext {
    settings: Settings,
    state_dir: PathBuf,
    home_dir: Option<PathBuf>,
    /// Highest-priority unit directory (`$DEISCTL_UNITS` or `units_dir`).
    units_override: Option<PathBuf>,
}

impl DispatchContext {
    /// Context with explicit paths. `units_override` is used as given; the
    /// environment is not consulted.
    pub fn new(
        settings: Settings,
        state_dir: PathBuf,
        home_dir: Option<PathBuf>,
        units_override: Option<PathBuf>,
    ) -> Self {
        Self {
            settings,
            state_dir,
            home_dir,
            units_override,
        }
    }

    /// Load settings from `settings_path` (or the default location) and
    /// resolve every path against the environment.
    pub fn with_defaults(
        settings_path: Option<&Path>,
        backend: Option<BackendKind>,
    ) -> Result<Self> {
        let store = match settings_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Settings(format!(
                        "settings file not found: {}",
                        path.display()
                    )));
                }
                SettingsStore::new(path)
            }
            None => SettingsStore::from_default_location()?,
        };
        let mut settings = store.load()?;
        if let Some(kind) = backend {
            settings.backend = kind;
        }

        let state_dir = match &settings.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };
        let units_override = std::env::var_os(UNITS_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.units_dir.clone());

        tracing::debug!(
            settings = %store.path().display(),
            backend = ?settings.backend,
            kv = ?settings.kv,
            state_dir = %state_dir.display(),
            "Loaded settings"
        );
        Ok(Self::new(
            settings,
            state_dir,
            dirs::home_dir(),
            units_override,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    pub fn keyspace(&self) -> Keyspace {
        Keyspace::new(self.settings.namespace.clone())
    }

    pub fn unit_search_path(&self) -> UnitSearchPath {
        UnitSearchPath::standard(self.units_override.clone(), self.home_dir.as_deref())
    }

    /// Default destination for `refresh-units`.
    pub fn default_units_dir(&self) -> Result<PathBuf> {
        self.home_dir
            .as_deref()
            .map(default_user_units_dir)
            .ok_or_else(|| Error::argument("could not determine home directory, pass --path"))
    }

    pub fn backend(&self) -> Box<dyn Backend> {
        match self.settings.backend {
            BackendKind::Local => Box::new(LocalBackend::new(&self.state_dir)),
            BackendKind::Fleet => {
                let fleet = &self.settings.fleet;
                Box::new(FleetBackend::new(
                    fleet.binary.clone(),
                    fleet.endpoint.clone(),
                    fleet.tunnel.clone(),
                    &self.state_dir,
                ))
            }
        }
    }

    pub fn kv_store(&self) -> Box<dyn KvStore> {
        match self.settings.kv {
            KvKind::File => Box::new(FileKvStore::in_dir(&self.state_dir)),
            KvKind::Etcd => Box::new(EtcdctlStore::new(
                self.settings.etcd.binary.clone(),
                self.settings.etcd.endpoint.clone(),
            )),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.backend(),
            self.kv_store(),
            self.keyspace(),
            self.unit_search_path(),
            self.home_dir.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_settings_file_must_exist() {
        let temp = TempDir::new().unwrap();
        let err = DispatchContext::with_defaults(Some(&temp.path().join("missing.toml")), None)
            .unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[test]
    fn backend_flag_overrides_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deisctl.toml");
        std::fs::write(
            &path,
            format!(
                "backend = \"local\"\nstate_dir = \"{}\"\n",
                temp.path().join("state").display()
            ),
        )
        .unwrap();

        let ctx = DispatchContext::with_defaults(Some(&path), Some(BackendKind::Fleet)).unwrap();
        assert_eq!(ctx.settings().backend, BackendKind::Fleet);
        assert_eq!(ctx.backend().name(), "fleet");
        assert_eq!(ctx.state_dir(), temp.path().join("state"));
    }

    #[test]
    fn missing_settings_file_selects_fleet_and_etcd() {
        let temp = TempDir::new().unwrap();
        let store = SettingsStore::new(temp.path().join(crate::settings::SETTINGS_FILE));
        let ctx = DispatchContext::new(store.load().unwrap(), temp.path().join("state"), None, None);
        assert_eq!(ctx.settings().kv, KvKind::Etcd);
        assert_eq!(ctx.backend().name(), "fleet");
    }

    #[test]
    fn override_dir_is_searched_first() {
        let temp = TempDir::new().unwrap();
        let ctx = DispatchContext::new(
            Settings::default(),
            temp.path().join("state"),
            Some(temp.path().join("home")),
            Some(temp.path().join("units")),
        );
        let search = ctx.unit_search_path();
        assert_eq!(search.dirs()[0], temp.path().join("units"));
        assert_eq!(
            search.dirs()[1],
            temp.path().join("home").join(".deis").join("units")
        );
    }
}
