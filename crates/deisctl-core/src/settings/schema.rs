//! deisctl.toml schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::kv::DEFAULT_NAMESPACE;
use crate::units::DEFAULT_UNITS_URL;

/// Which key/value store holds component configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvKind {
    /// JSON file in the state directory.
    File,
    /// etcd, through `etcdctl`.
    #[default]
    Etcd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendKind,
    pub kv: KvKind,
    /// Top-level key namespace, `/<namespace>/<component>/<key>`.
    pub namespace: String,
    /// Unit directory searched before `~/.deis/units`; `$DEISCTL_UNITS` wins over it.
    pub units_dir: Option<PathBuf>,
    /// Where local backend state and rendered units live.
    pub state_dir: Option<PathBuf>,
    /// Base URL for `refresh-units`.
    pub units_url: String,
    pub fleet: FleetSettings,
    pub etcd: EtcdSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            kv: KvKind::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            units_dir: None,
            state_dir: None,
            units_url: DEFAULT_UNITS_URL.to_string(),
            fleet: FleetSettings::default(),
            etcd: EtcdSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.namespace.contains('/') {
            return Err(Error::Settings(format!(
                "namespace '{}' must be non-empty and must not contain '/'",
                self.namespace
            )));
        }
        url::Url::parse(&self.units_url)
            .map_err(|e| Error::Settings(format!("units_url '{}': {e}", self.units_url)))?;
        if self.fleet.binary.is_empty() || self.etcd.binary.is_empty() {
            return Err(Error::Settings("binary paths must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub binary: String,
    /// Passed as `--endpoint`.
    pub endpoint: Option<String>,
    /// Passed as `--tunnel` (SSH host used to reach the cluster).
    pub tunnel: Option<String>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            binary: "fleetctl".to_string(),
            endpoint: None,
            tunnel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdSettings {
    pub binary: String,
    pub endpoint: Option<String>,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            binary: "etcdctl".to_string(),
            endpoint: None,
        }
    }
}
