//! fleet backend driven through the `fleetctl` binary.
//!
//! Cluster state is read once per call with `fleetctl list-units`; per-instance
//! actions then fan out in parallel.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context;

use crate::catalog;
use crate::error::{Error, Result, TargetError};
use crate::target::{Instance, Target};
use crate::units::UnitDefinition;

use super::{
    Action, Backend, InstallOptions, InstanceState, InstanceStatus, JobOutcome, TargetOutcome,
    expand, session,
};

/// One row of `fleetctl list-units`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetUnit {
    pub name: String,
    pub load: String,
    pub active: String,
    pub sub: String,
    pub machine: Option<String>,
}

impl FleetUnit {
    pub fn is_running(&self) -> bool {
        self.active == "active"
    }
}

#[derive(Debug, Clone)]
pub struct FleetBackend {
    binary: String,
    endpoint: Option<String>,
    tunnel: Option<String>,
    render_dir: PathBuf,
}

impl FleetBackend {
    pub fn new(
        binary: impl Into<String>,
        endpoint: Option<String>,
        tunnel: Option<String>,
        state_dir: &Path,
    ) -> Self {
        Self {
            binary: binary.into(),
            endpoint,
            tunnel,
            render_dir: state_dir.join("fleet-units"),
        }
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(endpoint) = &self.endpoint {
            args.push(format!("--endpoint={endpoint}"));
        }
        if let Some(tunnel) = &self.tunnel {
            args.push(format!("--tunnel={tunnel}"));
        }
        args
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.global_args()).args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        tracing::debug!(binary = %self.binary, ?args, "Running fleetctl");
        self.command(args).output()
    }

    fn list_units(&self) -> Result<BTreeMap<String, FleetUnit>> {
        let output = self
            .run(&[
                "list-units",
                "--no-legend",
                "--full",
                "--fields=unit,load,active,sub,machine",
            ])
            .map_err(|e| Error::unavailable(format!("failed to run {}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(Error::unavailable(
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(parse_list_units(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .map(|unit| (unit.name.clone(), unit))
            .collect())
    }

    /// Run a per-unit fleetctl action and translate its exit status.
    fn unit_action(&self, args: &[&str]) -> JobOutcome {
        match self.run(args) {
            Ok(output) if output.status.success() => JobOutcome::Succeeded,
            Ok(output) => JobOutcome::Failed(TargetError::Backend(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            Err(e) => JobOutcome::Failed(TargetError::Backend(format!(
                "failed to run {}: {e}",
                self.binary
            ))),
        }
    }

    /// Write the unit template under the instance's unit name so fleet picks
    /// the right name on load.
    fn render(&self, instance: &Instance, definition: &UnitDefinition) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.render_dir).with_context(|| {
            format!(
                "Failed to create unit render directory: {}",
                self.render_dir.display()
            )
        })?;
        let content = std::fs::read_to_string(&definition.path).with_context(|| {
            format!("Failed to read unit file: {}", definition.path.display())
        })?;
        let path = self.render_dir.join(instance.unit_name());
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write unit file: {}", path.display()))?;
        Ok(path)
    }

    fn load_instance(
        &self,
        units: &BTreeMap<String, FleetUnit>,
        instance: &Instance,
        options: &InstallOptions,
    ) -> JobOutcome {
        let unit = instance.unit_name();
        if units.contains_key(&unit) {
            return JobOutcome::AlreadyInDesiredState;
        }
        if instance.index != 1 && !catalog::is_scalable(&instance.component) {
            return JobOutcome::Failed(TargetError::NotScalable {
                component: instance.component.clone(),
            });
        }
        let Some(definition) = options.units.find(&instance.component) else {
            return JobOutcome::Failed(TargetError::UnitFileNotFound {
                component: instance.component.clone(),
            });
        };
        match self.render(instance, &definition) {
            Ok(path) => {
                let path = path.to_string_lossy().into_owned();
                self.unit_action(&["load", path.as_str()])
            }
            Err(e) => JobOutcome::Failed(TargetError::Backend(format!("{e:#}"))),
        }
    }

    fn start_instance(&self, units: &BTreeMap<String, FleetUnit>, instance: &Instance) -> JobOutcome {
        match units.get(&instance.unit_name()) {
            None => JobOutcome::NotFound,
            Some(unit) if unit.is_running() => JobOutcome::AlreadyInDesiredState,
            Some(unit) => self.unit_action(&["start", "--no-block", unit.name.as_str()]),
        }
    }

    fn running_unit(&self, instance: &Instance) -> Result<std::result::Result<FleetUnit, JobOutcome>> {
        let units = self.list_units()?;
        Ok(match units.get(&instance.unit_name()) {
            None => Err(JobOutcome::NotFound),
            Some(unit) if !unit.is_running() => {
                Err(JobOutcome::Failed(TargetError::TargetNotRunning))
            }
            Some(unit) => Ok(unit.clone()),
        })
    }
}

impl Backend for FleetBackend {
    fn name(&self) -> &'static str {
        "fleet"
    }

    /// Components load one after another in the given order; instances of
    /// one component load in parallel.
    fn install(&self, targets: &[Target], options: &InstallOptions) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
        let mut outcomes = Vec::new();
        for target in targets {
            outcomes.extend(fan_out(
                target.instances().collect(),
                Action::Install,
                |instance| self.load_instance(&units, instance, options),
            ));
        }
        Ok(outcomes)
    }

    fn uninstall(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
        Ok(fan_out(expand(targets), Action::Uninstall, |instance| {
            let unit = instance.unit_name();
            if units.contains_key(&unit) {
                self.unit_action(&["destroy", unit.as_str()])
            } else {
                JobOutcome::AlreadyInDesiredState
            }
        }))
    }

    fn start(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
        Ok(fan_out(expand(targets), Action::Start, |instance| {
            self.start_instance(&units, instance)
        }))
    }

    fn stop(&self, targets: &[Target]) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
        Ok(fan_out(expand(targets), Action::Stop, |instance| {
            match units.get(&instance.unit_name()) {
                None => JobOutcome::NotFound,
                Some(unit) if !unit.is_running() => JobOutcome::AlreadyInDesiredState,
                Some(unit) => self.unit_action(&["stop", "--no-block", unit.name.as_str()]),
            }
        }))
    }

    fn scale(&self, targets: &[Target], options: &InstallOptions) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
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

            let mut surplus: Vec<Instance> = units
                .keys()
                .filter_map(|name| Instance::from_unit_name(name))
                .filter(|i| i.component == target.component && i.index > count)
                .collect();
            // Sequential and highest first: lower indexes keep their identity.
            surplus.sort_by(|a, b| b.index.cmp(&a.index));
            for instance in surplus {
                let unit = instance.unit_name();
                let outcome = self.unit_action(&["destroy", unit.as_str()]);
                outcomes.push(TargetOutcome::new(instance, Action::Scale, outcome));
            }

            outcomes.extend(fan_out(
                target.instances().collect(),
                Action::Scale,
                |instance| match self.load_instance(&units, instance, options) {
                    JobOutcome::Succeeded => {
                        let unit = instance.unit_name();
                        self.unit_action(&["start", "--no-block", unit.as_str()])
                    }
                    JobOutcome::AlreadyInDesiredState => self.start_instance(&units, instance),
                    failed => failed,
                },
            ));
        }
        Ok(outcomes)
    }

    fn status(&self, targets: &[Target]) -> Result<Vec<InstanceStatus>> {
        let units = self.list_units()?;
        Ok(expand(targets)
            .into_iter()
            .map(|instance| match units.get(&instance.unit_name()) {
                Some(unit) => InstanceStatus {
                    unit: unit.name.clone(),
                    instance,
                    state: if unit.is_running() {
                        InstanceState::Running
                    } else {
                        InstanceState::Installed
                    },
                    machine: unit.machine.clone(),
                    since: None,
                },
                None => InstanceStatus::uninstalled(instance),
            })
            .collect())
    }

    fn list(&self) -> Result<Vec<Target>> {
        let mut by_component: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for instance in self.list_units()?.keys().filter_map(|n| Instance::from_unit_name(n)) {
            by_component
                .entry(instance.component)
                .or_default()
                .push(instance.index);
        }
        let mut targets: Vec<Target> = by_component
            .into_iter()
            .map(|(component, indexes)| Target::new(component, indexes))
            .collect();
        targets.sort_by_key(|t| catalog::order(&t.component));
        Ok(targets)
    }

    fn journal(&self, targets: &[Target], out: &mut dyn Write) -> Result<Vec<TargetOutcome>> {
        let units = self.list_units()?;
        let mut outcomes = Vec::new();
        for instance in expand(targets) {
            let unit = instance.unit_name();
            let outcome = if units.contains_key(&unit) {
                writeln!(out, "-- {unit} --")?;
                session::captured(self.command(["journal", "--lines=100", unit.as_str()]), out)?
            } else {
                JobOutcome::NotFound
            };
            outcomes.push(TargetOutcome::new(instance, Action::Journal, outcome));
        }
        Ok(outcomes)
    }

    fn ssh(&self, instance: &Instance, command: &[String], out: &mut dyn Write) -> Result<TargetOutcome> {
        let unit = match self.running_unit(instance)? {
            Ok(unit) => unit,
            Err(outcome) => return Ok(TargetOutcome::new(instance.clone(), Action::Ssh, outcome)),
        };
        let mut cmd = self.command(["ssh", unit.name.as_str()]);
        let outcome = if command.is_empty() {
            session::interactive(cmd)
        } else {
            cmd.args(command);
            session::captured(cmd, out)?
        };
        Ok(TargetOutcome::new(instance.clone(), Action::Ssh, outcome))
    }

    fn dock(&self, instance: &Instance, command: &[String], out: &mut dyn Write) -> Result<TargetOutcome> {
        let unit = match self.running_unit(instance)? {
            Ok(unit) => unit,
            Err(outcome) => return Ok(TargetOutcome::new(instance.clone(), Action::Dock, outcome)),
        };
        let container = instance.container_name();
        let mut cmd = self.command(["ssh", unit.name.as_str(), "docker", "exec"]);
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

/// Run `op` for every instance in parallel, keeping input order in the result.
fn fan_out<F>(instances: Vec<Instance>, action: Action, op: F) -> Vec<TargetOutcome>
where
    F: Fn(&Instance) -> JobOutcome + Sync,
{
    let op = &op;
    std::thread::scope(|scope| {
        let handles: Vec<_> = instances
            .iter()
            .map(|instance| scope.spawn(move || op(instance)))
            .collect();
        handles
            .into_iter()
            .zip(instances.iter())
            .map(|(handle, instance)| {
                let outcome = handle.join().unwrap_or_else(|_| {
                    JobOutcome::Failed(TargetError::Backend("worker panicked".to_string()))
                });
                TargetOutcome::new(instance.clone(), action, outcome)
            })
            .collect()
    })
}

/// Parse `fleetctl list-units --no-legend --fields=unit,load,active,sub,machine`.
pub fn parse_list_units(stdout: &str) -> Vec<FleetUnit> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?.to_string();
            let load = fields.next()?.to_string();
            let active = fields.next()?.to_string();
            let sub = fields.next()?.to_string();
            let machine = fields.next().filter(|m| *m != "-").map(str::to_string);
            Some(FleetUnit {
                name,
                load,
                active,
                sub,
                machine,
            })
        })
        .collect()
}
