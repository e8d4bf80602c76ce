//! etcd store driven through the `etcdctl` (v2 API) binary.

use std::process::{Command, Output};

use crate::error::{Error, Result};

use super::KvStore;

#[derive(Debug, Clone)]
pub struct EtcdctlStore {
    binary: String,
    endpoint: Option<String>,
}

impl EtcdctlStore {
    pub fn new(binary: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            endpoint,
        }
    }

    fn command_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut all = Vec::with_capacity(args.len() + 2);
        if let Some(endpoint) = &self.endpoint {
            all.extend(["--endpoint", endpoint.as_str()]);
        }
        all.extend_from_slice(args);
        all
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let args = self.command_args(args);
        tracing::debug!(binary = %self.binary, ?args, "Running etcdctl");
        Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| Error::unavailable(format!("failed to run {}: {e}", self.binary)))
    }
}

impl KvStore for EtcdctlStore {
    fn get(&self, path: &str) -> Result<Option<String>> {
        let output = self.run(&["get", path])?;
        if output.status.success() {
            return Ok(Some(strip_newline(&String::from_utf8_lossy(&output.stdout))));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_key_not_found(&stderr) {
            return Ok(None);
        }
        Err(Error::unavailable(stderr.trim()))
    }

    fn set(&self, path: &str, value: &str) -> Result<()> {
        // `--` keeps values such as PEM keys from being read as flags.
        let output = self.run(&["set", "--", path, value])?;
        if output.status.success() {
            return Ok(());
        }
        Err(Error::unavailable(
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let output = self.run(&["rm", path])?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_key_not_found(&stderr) {
            return Ok(false);
        }
        Err(Error::unavailable(stderr.trim()))
    }

    fn list(&self, dir: &str) -> Result<Vec<(String, String)>> {
        let output = self.run(&["ls", dir])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_key_not_found(&stderr) {
                return Ok(Vec::new());
            }
            return Err(Error::unavailable(stderr.trim()));
        }

        let mut entries = Vec::new();
        for (key, path) in parse_ls(&String::from_utf8_lossy(&output.stdout), dir) {
            // A key may vanish between `ls` and `get`; skip it.
            if let Some(value) = self.get(&path)? {
                entries.push((key, value));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn is_key_not_found(stderr: &str) -> bool {
    stderr.contains("Key not found") || stderr.contains("key not found")
}

fn strip_newline(value: &str) -> String {
    value.strip_suffix('\n').unwrap_or(value).to_string()
}

/// Parse `etcdctl ls <dir>` output into `(key, full path)` pairs of direct children.
fn parse_ls(stdout: &str, dir: &str) -> Vec<(String, String)> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let key = line.strip_prefix(&prefix)?;
            (!key.is_empty() && !key.contains('/')).then(|| (key.to_string(), line.to_string()))
        })
        .collect()
}
