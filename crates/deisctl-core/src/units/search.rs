//! Local unit definition lookup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog;

/// Environment variable that overrides the unit search path.
pub const UNITS_ENV: &str = "DEISCTL_UNITS";

/// System-wide unit directory, searched last.
pub const SYSTEM_UNITS_DIR: &str = "/var/lib/deis/units";

/// A unit template found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Unit name without extension, e.g. `deis-router`.
    pub name: String,
    pub path: PathBuf,
}

/// Ordered list of directories searched for unit definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSearchPath {
    dirs: Vec<PathBuf>,
}

impl UnitSearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Standard search order: override directory, `~/.deis/units`, `/var/lib/deis/units`.
    pub fn standard(override_dir: Option<PathBuf>, home_dir: Option<&Path>) -> Self {
        let mut dirs = Vec::with_capacity(3);
        dirs.extend(override_dir);
        if let Some(home) = home_dir {
            dirs.push(default_user_units_dir(home));
        }
        dirs.push(PathBuf::from(SYSTEM_UNITS_DIR));
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Find the definition for `component`. The first directory holding the
    /// file wins; directories are never merged.
    pub fn find(&self, component: &str) -> Option<UnitDefinition> {
        let file_name = catalog::unit_file_name(component);
        self.dirs
            .iter()
            .filter(|dir| dir.is_dir())
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
            .map(|path| {
                tracing::debug!(component, path = %path.display(), "Found unit definition");
                UnitDefinition {
                    name: format!("deis-{component}"),
                    path,
                }
            })
    }
}

pub fn default_user_units_dir(home: &Path) -> PathBuf {
    home.join(".deis").join("units")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_unit(dir: &Path, component: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(catalog::unit_file_name(component)), body).unwrap();
    }

    #[test]
    fn standard_order_puts_override_first() {
        let home = PathBuf::from("/home/op");
        let path = UnitSearchPath::standard(Some(PathBuf::from("/opt/units")), Some(&home));
        assert_eq!(
            path.dirs(),
            &[
                PathBuf::from("/opt/units"),
                PathBuf::from("/home/op/.deis/units"),
                PathBuf::from(SYSTEM_UNITS_DIR),
            ]
        );
    }

    #[test]
    fn first_directory_with_the_file_wins() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        write_unit(&first, "router", "first");
        write_unit(&second, "router", "second");
        write_unit(&second, "controller", "second");

        let path = UnitSearchPath::new(vec![first.clone(), second.clone()]);
        assert_eq!(path.find("router").unwrap().path, first.join("deis-router.service"));
        // Not in the first directory: falls through, no merging of contents.
        assert_eq!(
            path.find("controller").unwrap().path,
            second.join("deis-controller.service")
        );
    }

    #[test]
    fn missing_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("units");
        write_unit(&real, "builder", "unit");

        let path = UnitSearchPath::new(vec![temp.path().join("missing"), real]);
        let found = path.find("builder").unwrap();
        assert_eq!(found.name, "deis-builder");
        assert!(path.find("database").is_none());
    }
}
