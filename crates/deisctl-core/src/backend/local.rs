//! Single-host backend that keeps unit state in a JSON document.
//!
//! Every transition is saved before the next one starts, so an interrupted
//! command leaves the state of the last completed step behind.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{Error, Result, TargetError};
use crate::target::{Instance, Target};

use super::{
    Action, Backend, InstallOptions, InstanceState, InstanceStatus, JobOutcome, TargetOutcome,
    expand, session,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalState {
    /// Keyed by unit name.
    #[serde(default)]
    units: BTreeMap<String, UnitRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnitRecord {
    instance: Instance,
    definition: PathBuf,
    running: bool,
    since: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LocalBackend {
    state_path: PathBuf,
    journal_dir: PathBuf,
    machine: String,
    shell: String,
}

impl LocalBackend {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            state_path: state_dir.join("backend.json"),
            journal_dir: state_dir.join("journal"),
            machine: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
        }
    }

    fn load(&self) -> Result<LocalState> {
        if !self.state_path.exists() {
            return Ok(LocalState::default());
        }
        let content = std::fs::read_to_string(&self.state_path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::unavailable(format!(
                "corrupt backend state {}: {e}",
                self.state_path.display()
            ))
        })
    }

    fn save(&self, state: &LocalState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| Error::unavailable(format!("failed to encode backend state: {e}")))?;
        let tmp = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    fn journal_path(&self, instance: &Instance) -> PathBuf {
        self.journal_dir
            .join(format!("{}.log", instance.unit_name()))
    }

    /// Append a line to the instance journal. Journal failures never fail the operation.
    fn log(&self, instance: &Instance, message: &str) {
        let path = self.journal_path(instance);
        let result = std::fs::create_dir_all(&self.journal_dir).and_then(|()| {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(
                file,
                "{} {} {}: {}",
                Utc::now().to_rfc3339(),
                self.machine,
                instance.unit_name(),
                message
            )
        });
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write journal");
        }
    }

    fn install_instance(
        &self,
        state: &mut LocalState,
        instance: &Instance,
        options: &InstallOptions,
    ) -> Result<JobOutcome> {
        let unit = instance.unit_name();
        if state.units.contains_key(&unit) {
            return Ok(JobOutcome::AlreadyInDesiredState);
        }
        if instance.index != 1 && !catalog::is_scalable(&instance.component) {
            return Ok(JobOutcome::Failed(TargetError::NotScalable {
                component: instance.component.clone(),
            }));
        }
        let Some(definition) = options.units.find(&instance.component) else {
            return Ok(JobOutcome::Failed(TargetError::UnitFileNotFound {
                component: instance.component.clone(),
            }));
        };

        state.units.insert(
            unit.clone(),
            UnitRecord {
                instance: instance.clone(),
                definition: definition.path.clone(),
                running: false,
                since: Utc::now(),
            },
        );
        self.save(state)?;
        self.log(
            instance,
            &format!("Loaded {} from {}", unit, definition.path.display()),
        );
        tracing::info!(unit, "Installed");
        Ok(JobOutcome::Succeeded)
    }

    fn uninstall_instance(&self, state: &mut LocalState, instance: &Instance) -> Result<JobOutcome> {
        let unit = instance.unit_name();
        let Some(record) = state.units.remove(&unit) else {
            return Ok(JobOutcome::AlreadyInDesiredState);
        };
        self.save(state)?;
        if record.running {
            self.log(instance, "Stopped");
        }
        self.log(instance, "Unloaded");
        tracing::info!(unit, "Uninstalled");
        Ok(JobOutcome::Succeeded)
    }

    fn set_running(
        &self,
        state: &mut LocalState,
        instance: &Instance,
        running: bool,
    ) -> Result<JobOutcome> {
        let unit = instance.unit_name();
        let Some(record) = state.units.get_mut(&unit) else {
            return Ok(JobOutcome::NotFound);
        };
        if record.running == running {
            return Ok(JobOutcome::AlreadyInDesiredState);
        }
        record.running = running;
        record.since = Utc::now();
        self.save(state)?;

        let verb = if running { "Started" } else { "Stopped" };
        self.log(instance, verb);
        tracing::info!(unit, "{verb}");
        Ok(JobOutcome::Succeeded)
    }

    fn each_instance<F>(&self, targets: &[Target], action: Action, mut op: F) -> Result<Vec<TargetOutcome>>
    where
        F: FnMut(&mut LocalState, &Instance) -> Result<JobOutcome>,
    {
        let mut state = self.load()?;
        expand(targets)
            .into_iter()
            .map(|instance| {
                let outcome = op(&mut state, &instance)?;
                Ok(TargetOutcome::new(instance, action, outcome))
            })
            .collect()
    }

    /// Check that `instance` is running before opening a session on it.
    fn session_precheck(&self, instance: &Instance) -> Result<Option<JobOutcome>> {
        let state = self.load()?;
        Ok(match state.units.get(&instance.unit_name()) {
            None => Some(JobOutcome::NotFound),
            Some(record) if !record.running => {
                Some(JobOutcome::Failed(TargetError::TargetNotRunning))
            }
            Some(_) => None,
        })
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn install(&self, targets: &[Target], options: &InstallOptions) -> Result<Vec<TargetOutcome>> {
        self.each_instance(targets, Action::Install, |state, instance| {
            self.install_instance(state, instance, options)
        })
    }

    fn uninstall(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        self.each_instance(targets, Action::Uninstall, |state, instance| {
            self.uninstall_instance(state, instance)
        })
    }

    fn start(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        self.each_instance(targets, Action::Start, |state, instance| {
            self.set_running(state, instance, true)
        })
    }

    fn stop(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        self.each_instance(targets, Action::Stop, |state, instance| {
            self.set_running(state, instance, false)
        })
    }

    fn scale(&self, targets: &[Target], options: &InstallOptions) -> Result<Vec<TargetOutcome>> {
        let mut state = self.load()?;
        let mut outcomes = Vec::new();

        for target in targets {
            let count = target.count();
            if count != 1 && !catalog::is_scalable(&target.component) {
                outcomes.push(TargetOutcome::new(
                    Instance::new(target.component.clone(), 1),
                    Action::Scale,
                    JobOutcome::Failed(TargetError::NotScalable {
                        component: target.component.clone(),
                    }),
                ));
                continue;
            }

            let mut surplus: Vec<u32> = state
                .units
                .values()
                .filter(|r| r.instance.component == target.component && r.instance.index > count)
                .map(|r| r.instance.index)
                .collect();
            // Highest index first so low indexes keep their identity.
            surplus.sort_unstable_by(|a, b| b.cmp(a));
            for index in surplus {
                let instance = Instance::new(target.component.clone(), index);
                let outcome = self.uninstall_instance(&mut state, &instance)?;
                outcomes.push(TargetOutcome::new(instance, Action::Scale, outcome));
            }

            for instance in target.instances() {
                let installed = self.install_instance(&mut state, &instance, options)?;
                let outcome = if installed.is_failure() {
                    installed
                } else {
                    let started = self.set_running(&mut state, &instance, true)?;
                    if installed == JobOutcome::Succeeded {
                        JobOutcome::Succeeded
                    } else {
                        started
                    }
                };
                outcomes.push(TargetOutcome::new(instance, Action::Scale, outcome));
            }
        }
        Ok(outcomes)
    }

    fn status(&self, targets: &[Target]) -> Result<Vec<InstanceStatus>> {
        let state = self.load()?;
        Ok(expand(targets)
            .into_iter()
            .map(|instance| match state.units.get(&instance.unit_name()) {
                Some(record) => InstanceStatus {
                    unit: instance.unit_name(),
                    instance,
                    state: if record.running {
                        InstanceState::Running
                    } else {
                        InstanceState::Installed
                    },
                    machine: Some(self.machine.clone()),
                    since: Some(record.since),
                },
                None => InstanceStatus::uninstalled(instance),
            })
            .collect())
    }

    fn list(&self) -> Result<Vec<Target>> {
        let state = self.load()?;
        let mut by_component: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for record in state.units.values() {
            by_component
                .entry(record.instance.component.clone())
                .or_default()
                .push(record.instance.index);
        }
        let mut targets: Vec<Target> = by_component
            .into_iter()
            .map(|(component, indexes)| Target::new(component, indexes))
            .collect();
        targets.sort_by_key(|t| catalog::order(&t.component));
        Ok(targets)
    }

    fn journal(&self, targets: &[Target], out: &mut dyn Write) -> Result<Vec<TargetOutcome>> {
        let state = self.load()?;
        let mut outcomes = Vec::new();
        for instance in expand(targets) {
            let path = self.journal_path(&instance);
            let installed = state.units.contains_key(&instance.unit_name());
            let outcome = match std::fs::read_to_string(&path) {
                Ok(content) => {
                    writeln!(out, "-- {} --", instance.unit_name())?;
                    out.write_all(content.as_bytes())?;
                    JobOutcome::Succeeded
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && installed => {
                    JobOutcome::Succeeded
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => JobOutcome::NotFound,
                Err(e) => JobOutcome::Failed(TargetError::Backend(format!(
                    "failed to read journal {}: {e}",
                    path.display()
                ))),
            };
            outcomes.push(TargetOutcome::new(instance, Action::Journal, outcome));
        }
        out.flush()?;
        Ok(outcomes)
    }

    fn ssh(&self, instance: &Instance, command: &[String], out: &mut dyn Write) -> Result<TargetOutcome> {
        if let Some(outcome) = self.session_precheck(instance)? {
            return Ok(TargetOutcome::new(instance.clone(), Action::Ssh, outcome));
        }
        let outcome = if command.is_empty() {
            session::interactive(Command::new(&self.shell))
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command.join(" "));
            session::captured(cmd, out)?
        };
        Ok(TargetOutcome::new(instance.clone(), Action::Ssh, outcome))
    }

    fn dock(&self, instance: &Instance, command: &[String], out: &mut dyn Write) -> Result<TargetOutcome> {
        if let Some(outcome) = self.session_precheck(instance)? {
            return Ok(TargetOutcome::new(instance.clone(), Action::Dock, outcome));
        }
        let container = instance.container_name();
        let mut cmd = Command::new("docker");
        cmd.arg("exec");
        let outcome = if command.is_empty() {
            cmd.args(["-it", container.as_str(), "/bin/sh"]);
            session::interactive(cmd)
        } else {
            cmd.arg(&container).args(command);
            session::captured(cmd, out)?
        };
        Ok(TargetOutcome::new(instance.clone(), Action::Dock, outcome))
    }
}
