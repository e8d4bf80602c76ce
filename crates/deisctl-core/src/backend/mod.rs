//! Scheduling backend abstraction.
//!
//! Every backend implements [`Backend`] for a resolved target set and reports
//! one [`TargetOutcome`] per instance. A failure on one instance never stops
//! the others; only [`Error::BackendUnavailable`](crate::error::Error) aborts a
//! whole call.

mod fleet;
mod local;
mod session;

pub use fleet::{FleetBackend, FleetUnit};
pub use local::LocalBackend;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, TargetError};
use crate::target::{Instance, Target};
use crate::units::UnitSearchPath;

/// Backend implementations selectable from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single-host supervisor with file-backed state.
    Local,
    /// fleet cluster driven through `fleetctl`.
    #[default]
    Fleet,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "fleet" => Ok(Self::Fleet),
            _ => Err(Error::Settings(format!(
                "invalid backend '{s}'. Use 'local' or 'fleet'"
            ))),
        }
    }
}

/// Operation a [`TargetOutcome`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Uninstall,
    Start,
    Stop,
    Scale,
    Status,
    Journal,
    Ssh,
    Dock,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Scale => "scale",
            Self::Status => "status",
            Self::Journal => "journal",
            Self::Ssh => "ssh",
            Self::Dock => "dock",
        };
        f.write_str(name)
    }
}

/// Result of one operation on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    AlreadyInDesiredState,
    NotFound,
    Failed(TargetError),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::Failed(_))
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("done"),
            Self::AlreadyInDesiredState => f.write_str("already in desired state"),
            Self::NotFound => write!(f, "{}", TargetError::ComponentNotFound),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub instance: Instance,
    pub action: Action,
    pub outcome: JobOutcome,
}

impl TargetOutcome {
    pub fn new(instance: Instance, action: Action, outcome: JobOutcome) -> Self {
        Self {
            instance,
            action,
            outcome,
        }
    }
}

/// Lifecycle state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Uninstalled,
    Installed,
    Running,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninstalled => "uninstalled",
            Self::Installed => "installed",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub instance: Instance,
    pub unit: String,
    pub state: InstanceState,
    pub machine: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl InstanceStatus {
    pub fn uninstalled(instance: Instance) -> Self {
        Self {
            unit: instance.unit_name(),
            instance,
            state: InstanceState::Uninstalled,
            machine: None,
            since: None,
        }
    }
}

/// Inputs needed to load unit definitions.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub units: UnitSearchPath,
}

impl InstallOptions {
    pub fn new(units: UnitSearchPath) -> Self {
        Self { units }
    }
}

/// Capability contract every scheduling backend implements.
pub trait Backend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Load unit definitions so targets become schedulable. Never starts them.
    fn install(&self, targets: &[Target], options: &InstallOptions)
    -> Result<Vec<TargetOutcome>>;

    /// Unload unit definitions. Absent units are already in the desired state.
    fn uninstall(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>>;

    fn start(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>>;

    fn stop(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>>;

    /// Stop followed unconditionally by start. Targets stop in reverse order
    /// and start in the given order, so the platform's router goes down first
    /// and comes up last. Not atomic: an interruption in between leaves the
    /// targets stopped.
    fn restart(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        let teardown: Vec<Target> = targets.iter().rev().cloned().collect();
        let mut outcomes = self.stop(&teardown)?;
        outcomes.extend(self.start(targets)?);
        Ok(outcomes)
    }

    /// Bring each component to `target.count()` running instances, removing
    /// the highest-indexed instances first when scaling down.
    fn scale(&self, targets: &[Target], options: &InstallOptions) -> Result<Vec<TargetOutcome>>;

    fn status(&self, targets: &[Target]) -> Result<Vec<InstanceStatus>>;

    /// Every installed component with its installed instances.
    fn list(&self) -> Result<Vec<Target>>;

    /// Write a snapshot of each target's log to `out`.
    fn journal(&self, targets: &[Target], out: &mut dyn Write) -> Result<Vec<TargetOutcome>>;

    /// Open a shell (empty `command`) or run `command` on the machine hosting `instance`.
    fn ssh(&self, instance: &Instance, command: &[String], out: &mut dyn Write)
    -> Result<TargetOutcome>;

    /// Like [`Backend::ssh`], but inside the instance's container.
    fn dock(&self, instance: &Instance, command: &[String], out: &mut dyn Write)
    -> Result<TargetOutcome>;
}

/// Every instance of every target, in target order.
pub(crate) fn expand(targets: &[Target]) -> Vec<Instance> {
    targets.iter().flat_map(Target::instances).collect()
}
