//! Download unit definitions from the upstream repository.

use std::path::{Path, PathBuf};

use anyhow::Context;
use url::Url;

use crate::catalog::{self, PLATFORM};

/// Upstream location of unit definitions; `<ref>/deisctl/units/<file>` is appended.
pub const DEFAULT_UNITS_URL: &str = "https://raw.githubusercontent.com/deis/deis";

/// Default git reference used by `refresh-units`.
pub const DEFAULT_UNITS_REF: &str = "master";

/// Files written by a refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub written: Vec<PathBuf>,
}

/// Build the download URL for one unit file.
///
/// `base` is e.g. `https://raw.githubusercontent.com/deis/deis`, `version_ref`
/// a tag, branch or commit SHA.
pub fn unit_file_url(base: &str, version_ref: &str, component: &str) -> anyhow::Result<Url> {
    if version_ref.is_empty() || version_ref.contains(['/', '?', '#']) {
        anyhow::bail!("Invalid unit version reference: '{}'", version_ref);
    }
    let raw = format!(
        "{}/{}/deisctl/units/{}",
        base.trim_end_matches('/'),
        version_ref,
        catalog::unit_file_name(component)
    );
    Url::parse(&raw).with_context(|| format!("Invalid unit source URL: {raw}"))
}

/// Fetch every platform unit at `version_ref` and overwrite the files in
/// `destination`. Files already written stay in place if a later fetch fails.
pub async fn refresh_units(
    destination: &Path,
    version_ref: &str,
    base: &str,
) -> anyhow::Result<RefreshReport> {
    std::fs::create_dir_all(destination).with_context(|| {
        format!(
            "Failed to create unit directory: {}",
            destination.display()
        )
    })?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("deisctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mut report = RefreshReport::default();
    for component in PLATFORM {
        let url = unit_file_url(base, version_ref, component.name)?;
        tracing::debug!(%url, "Fetching unit file");

        let response = client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch unit file from {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to fetch unit file: HTTP {} from {}",
                response.status(),
                url
            );
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read unit file body from {url}"))?;

        let path = destination.join(catalog::unit_file_name(component.name));
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write unit file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "Refreshed unit");
        report.written.push(path);
    }
    Ok(report)
}

/// Blocking wrapper around [`refresh_units`] for synchronous callers.
pub fn refresh_units_blocking(
    destination: &Path,
    version_ref: &str,
    base: &str,
) -> anyhow::Result<RefreshReport> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(refresh_units(destination, version_ref, base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_reference_and_unit_file() {
        let url = unit_file_url(DEFAULT_UNITS_URL, "v1.13.0", "router").unwrap();
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/deis/deis/v1.13.0/deisctl/units/deis-router.service"
        );
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let url = unit_file_url("https://example.com/units/", "master", "logger").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/units/master/deisctl/units/deis-logger.service"
        );
    }

    #[tokio::test]
    async fn unreachable_source_fails_without_writing() {
        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("units");
        let err = refresh_units(&dest, "master", "http://127.0.0.1:9")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to fetch unit file"));
        assert!(dest.is_dir());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn reference_cannot_escape_the_path() {
        assert!(unit_file_url(DEFAULT_UNITS_URL, "", "router").is_err());
        assert!(unit_file_url(DEFAULT_UNITS_URL, "../evil", "router").is_err());
        assert!(unit_file_url(DEFAULT_UNITS_URL, "v1?x=1", "router").is_err());
    }
}
