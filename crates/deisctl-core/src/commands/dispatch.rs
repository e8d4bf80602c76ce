//! Command dispatcher: validates arguments, resolves targets and issues
//! exactly one backend operation per command.
//!
//! Validation always completes before the backend is called, so a rejected
//! command leaves nothing behind. Once the backend runs, per-target failures
//! are collected into the report instead of aborting.

use std::io::Write;
use std::path::PathBuf;

use crate::backend::{Backend, InstallOptions, TargetOutcome};
use crate::catalog::{self, PLATFORM, ROUTER};
use crate::error::{Error, Result};
use crate::kv::{Keyspace, KvStore};
use crate::target::{self, Instance, ParseMode, Target};
use crate::units::UnitSearchPath;

use super::config::{self, ConfigAction, ConfigReport, SSH_PRIVATE_KEY};
use super::mesh::RouterMeshSize;
use super::report::{CommandReport, StatusReport};

/// Component holding platform-wide keys.
const PLATFORM_COMPONENT: &str = "platform";
/// Must be set before anything is installed.
const DOMAIN_KEY: &str = "domain";

pub struct Dispatcher {
    backend: Box<dyn Backend>,
    kv: Box<dyn KvStore>,
    keyspace: Keyspace,
    units: UnitSearchPath,
    home_dir: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(
        backend: Box<dyn Backend>,
        kv: Box<dyn KvStore>,
        keyspace: Keyspace,
        units: UnitSearchPath,
        home_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            backend,
            kv,
            keyspace,
            units,
            home_dir,
        }
    }

    /// Load unit definitions. No targets (or `platform`) installs every
    /// platform component with `mesh` routers.
    pub fn install(&self, tokens: &[String], mesh: RouterMeshSize) -> Result<CommandReport> {
        let targets = if target::is_whole_platform(tokens) {
            platform_targets(mesh)
        } else {
            self.resolve(tokens)?
        };
        let warnings = self.check_required_keys()?;
        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Installing");
        let options = InstallOptions::new(self.units.clone());
        let mut report =
            CommandReport::with_outcomes("install", self.backend.install(&targets, &options)?);
        report.warnings = warnings;
        Ok(report)
    }

    pub fn uninstall(&self, tokens: &[String]) -> Result<CommandReport> {
        let targets = self.resolve_teardown(tokens)?;
        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Uninstalling");
        Ok(CommandReport::with_outcomes(
            "uninstall",
            self.backend.uninstall(&targets)?,
        ))
    }

    pub fn start(&self, tokens: &[String]) -> Result<CommandReport> {
        let targets = self.resolve(tokens)?;
        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Starting");
        Ok(CommandReport::with_outcomes("start", self.backend.start(&targets)?))
    }

    pub fn stop(&self, tokens: &[String]) -> Result<CommandReport> {
        let targets = self.resolve_teardown(tokens)?;
        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Stopping");
        Ok(CommandReport::with_outcomes("stop", self.backend.stop(&targets)?))
    }

    /// Stop then start. An interruption in between leaves targets stopped;
    /// running the command again recovers.
    pub fn restart(&self, tokens: &[String]) -> Result<CommandReport> {
        let targets = self.resolve(tokens)?;
        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Restarting");
        Ok(CommandReport::with_outcomes(
            "restart",
            self.backend.restart(&targets)?,
        ))
    }

    /// `router@5` (or `router=5`) asks for five running routers.
    pub fn scale(&self, tokens: &[String]) -> Result<CommandReport> {
        if tokens.is_empty() {
            return Err(Error::argument(
                "scale requires at least one target, e.g. deisctl scale router@3",
            ));
        }
        let targets = target::resolve(tokens, ParseMode::Scale, &[])?;
        tracing::info!(backend = self.backend.name(), targets = targets.len(), "Scaling");
        let options = InstallOptions::new(self.units.clone());
        Ok(CommandReport::with_outcomes(
            "scale",
            self.backend.scale(&targets, &options)?,
        ))
    }

    pub fn status(&self, tokens: &[String]) -> Result<StatusReport> {
        let targets = self.resolve(tokens)?;
        Ok(StatusReport {
            statuses: self.backend.status(&targets)?,
        })
    }

    pub fn list(&self) -> Result<Vec<Target>> {
        self.backend.list()
    }

    pub fn journal(&self, tokens: &[String], out: &mut dyn Write) -> Result<CommandReport> {
        let targets = self.resolve(tokens)?;
        Ok(CommandReport::with_outcomes(
            "journal",
            self.backend.journal(&targets, out)?,
        ))
    }

    pub fn ssh(&self, token: &str, command: &[String], out: &mut dyn Write) -> Result<CommandReport> {
        let instance = self.resolve_single(token)?;
        tracing::debug!(%instance, "Opening ssh session");
        let outcome = self.backend.ssh(&instance, command, out)?;
        Ok(single("ssh", outcome))
    }

    pub fn dock(&self, token: &str, command: &[String], out: &mut dyn Write) -> Result<CommandReport> {
        let instance = self.resolve_single(token)?;
        tracing::debug!(%instance, "Opening container session");
        let outcome = self.backend.dock(&instance, command, out)?;
        Ok(single("dock", outcome))
    }

    pub fn config(&self, component: &str, action: &ConfigAction) -> Result<ConfigReport> {
        config::run(
            self.kv.as_ref(),
            &self.keyspace,
            component,
            action,
            self.home_dir.as_deref(),
        )
    }

    /// Address-mode resolution against what is installed. `platform` or no
    /// tokens means everything installed.
    fn resolve(&self, tokens: &[String]) -> Result<Vec<Target>> {
        let tokens: &[String] = if target::is_whole_platform(tokens) {
            &[]
        } else {
            tokens
        };
        // Syntax errors surface before the backend is contacted.
        target::resolve(tokens, ParseMode::Address, &[])?;
        let installed = self.backend.list()?;
        target::resolve(tokens, ParseMode::Address, &installed)
    }

    /// Like [`Self::resolve`], but a whole-platform teardown runs router first.
    fn resolve_teardown(&self, tokens: &[String]) -> Result<Vec<Target>> {
        let mut targets = self.resolve(tokens)?;
        if target::is_whole_platform(tokens) {
            targets.reverse();
        }
        Ok(targets)
    }

    /// One instance for ssh/dock. A bare name picks the lowest installed instance.
    fn resolve_single(&self, token: &str) -> Result<Instance> {
        if token == catalog::PLATFORM_TOKEN {
            return Err(Error::argument("ssh and dock need a single component target"));
        }
        let targets = self.resolve(&[token.to_string()])?;
        targets
            .first()
            .and_then(|t| t.instances().next())
            .ok_or_else(|| Error::InvalidTargetSyntax {
                token: token.to_string(),
            })
    }

    /// Fails when `domain` is unset; returns warnings for optional keys.
    fn check_required_keys(&self) -> Result<Vec<String>> {
        let domain = self.keyspace.key_path(PLATFORM_COMPONENT, DOMAIN_KEY)?;
        if self.kv.get(&domain)?.is_none() {
            return Err(Error::MissingRequiredKey {
                path: domain,
                component: PLATFORM_COMPONENT.to_string(),
                key: DOMAIN_KEY.to_string(),
            });
        }

        let mut warnings = Vec::new();
        let ssh_key = self.keyspace.key_path(PLATFORM_COMPONENT, SSH_PRIVATE_KEY)?;
        if self.kv.get(&ssh_key)?.is_none() {
            warnings.push(format!(
                "{ssh_key} is not set, use: deisctl config {PLATFORM_COMPONENT} set {SSH_PRIVATE_KEY}=<path>"
            ));
        }
        Ok(warnings)
    }
}

/// Every platform component, one instance each, with `mesh` routers.
pub fn platform_targets(mesh: RouterMeshSize) -> Vec<Target> {
    PLATFORM
        .iter()
        .map(|component| {
            let count = if component.name == ROUTER {
                u32::from(mesh.get())
            } else {
                1
            };
            Target::with_count(component.name, count)
        })
        .collect()
}

fn single(command: &'static str, outcome: TargetOutcome) -> CommandReport {
    CommandReport::with_outcomes(command, vec![outcome])
}
