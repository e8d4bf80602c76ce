//! `deisctl config <component> get|set|rm`.
//!
//! Keys live at `/<namespace>/<component>/<key>`. Writes are independent: the
//! arguments are validated up front, then each key is written on its own and
//! a failed write leaves earlier ones in place.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{EXIT_OK, EXIT_PARTIAL, Error, Result};
use crate::kv::{Keyspace, KvStore};

/// Key whose value is given as a file path; the file's contents are stored.
pub const SSH_PRIVATE_KEY: &str = "sshPrivateKey";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Empty means every key of the component.
    Get(Vec<String>),
    Set(Vec<(String, String)>),
    Remove(Vec<String>),
}

impl ConfigAction {
    /// Parse `get|set|rm` and its arguments.
    pub fn parse(verb: &str, args: &[String]) -> Result<Self> {
        match verb {
            "get" => Ok(Self::Get(args.to_vec())),
            "set" => {
                if args.is_empty() {
                    return Err(Error::argument("config set requires at least one key=value"));
                }
                let pairs = args
                    .iter()
                    .map(|arg| match arg.split_once('=') {
                        Some((key, value)) if !key.is_empty() => {
                            Ok((key.to_string(), value.to_string()))
                        }
                        _ => Err(Error::argument(format!(
                            "invalid argument '{arg}': expected key=value"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Set(pairs))
            }
            "rm" => {
                if args.is_empty() {
                    return Err(Error::argument("config rm requires at least one key"));
                }
                Ok(Self::Remove(args.to_vec()))
            }
            other => Err(Error::argument(format!(
                "unknown config action '{other}'. Use get, set or rm"
            ))),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Get(_) => "get",
            Self::Set(_) => "set",
            Self::Remove(_) => "rm",
        }
    }

    fn keys(&self) -> Vec<&str> {
        match self {
            Self::Get(keys) | Self::Remove(keys) => keys.iter().map(String::as_str).collect(),
            Self::Set(pairs) => pairs.iter().map(|(k, _)| k.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// A key whose individual write or removal failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigReport {
    pub component: String,
    /// `get`: values found. `set`: values written.
    pub entries: Vec<ConfigEntry>,
    /// `rm`: keys that existed and were deleted.
    pub removed: Vec<String>,
    pub failures: Vec<KeyFailure>,
}

impl ConfigReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }
}

/// Run a config action against `store`.
///
/// `home` is used to expand a leading `~` in the `sshPrivateKey` path.
pub fn run(
    store: &dyn KvStore,
    keyspace: &Keyspace,
    component: &str,
    action: &ConfigAction,
    home: Option<&Path>,
) -> Result<ConfigReport> {
    let dir = keyspace.component_dir(component)?;
    for key in action.keys() {
        keyspace.key_path(component, key)?;
    }

    let mut report = ConfigReport {
        component: component.to_string(),
        ..ConfigReport::default()
    };

    match action {
        ConfigAction::Get(keys) if keys.is_empty() => {
            report.entries = store
                .list(&dir)?
                .into_iter()
                .map(|(key, value)| ConfigEntry { key, value })
                .collect();
        }
        ConfigAction::Get(keys) => {
            for key in keys {
                if let Some(value) = store.get(&keyspace.key_path(component, key)?)? {
                    report.entries.push(ConfigEntry {
                        key: key.clone(),
                        value,
                    });
                }
            }
        }
        ConfigAction::Set(pairs) => {
            for (key, value) in pairs {
                let value = if key == SSH_PRIVATE_KEY {
                    match read_private_key(value, home) {
                        Ok(contents) => contents,
                        Err(reason) => {
                            report.failures.push(KeyFailure {
                                key: key.clone(),
                                reason,
                            });
                            continue;
                        }
                    }
                } else {
                    value.clone()
                };
                match store.set(&keyspace.key_path(component, key)?, &value) {
                    Ok(()) => {}
                    // Nothing landed yet: the command failed as a whole.
                    Err(e) if report.entries.is_empty() => return Err(e),
                    Err(e) => {
                        tracing::warn!(component, key = %key, error = %e, "Config write failed");
                        report.failures.push(KeyFailure {
                            key: key.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
                tracing::info!(component, key = %key, "Config value set");
                report.entries.push(ConfigEntry {
                    key: key.clone(),
                    value,
                });
            }
        }
        ConfigAction::Remove(keys) => {
            for key in keys {
                if store.remove(&keyspace.key_path(component, key)?)? {
                    tracing::info!(component, key = %key, "Config value removed");
                    report.removed.push(key.clone());
                } else {
                    tracing::debug!(component, key = %key, "Key was not set");
                }
            }
        }
    }
    Ok(report)
}

fn read_private_key(value: &str, home: Option<&Path>) -> std::result::Result<String, String> {
    let path = expand_home(value, home);
    std::fs::read_to_string(&path)
        .map_err(|e| format!("could not read private key {}: {e}", path.display()))
}

/// Expand a leading `~` or `~/` against `home`.
pub fn expand_home(value: &str, home: Option<&Path>) -> PathBuf {
    match (value.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(value),
    }
}
