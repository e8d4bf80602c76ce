//! Mapping from (component, key) to hierarchical store paths.

use crate::error::{Error, Result};

/// Default top-level namespace for platform configuration.
pub const DEFAULT_NAMESPACE: &str = "deis";

/// Lays out configuration as `/<namespace>/<component>/<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Directory holding every key of `component`.
    pub fn component_dir(&self, component: &str) -> Result<String> {
        check_segment("component", component)?;
        Ok(format!("/{}/{}", self.namespace, component))
    }

    pub fn key_path(&self, component: &str, key: &str) -> Result<String> {
        check_segment("key", key)?;
        Ok(format!("{}/{}", self.component_dir(component)?, key))
    }
}

fn check_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') || segment.chars().any(char::is_whitespace) {
        return Err(Error::argument(format!(
            "invalid {what} '{segment}': must be non-empty without '/' or whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_paths_nest_under_namespace_and_component() {
        let keys = Keyspace::default();
        assert_eq!(
            keys.key_path("platform", "domain").unwrap(),
            "/deis/platform/domain"
        );
        assert_eq!(keys.component_dir("router").unwrap(), "/deis/router");
    }

    #[test]
    fn custom_namespace() {
        let keys = Keyspace::new("staging");
        assert_eq!(
            keys.key_path("controller", "webEnabled").unwrap(),
            "/staging/controller/webEnabled"
        );
    }

    #[test]
    fn segments_cannot_contain_separators() {
        let keys = Keyspace::default();
        assert!(keys.key_path("platform", "a/b").is_err());
        assert!(keys.key_path("", "domain").is_err());
        assert!(keys.key_path("platform", "").is_err());
        assert!(keys.component_dir("plat form").is_err());
    }
}
