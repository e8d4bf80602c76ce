//! Uniform reports returned by the dispatcher.

use crate::backend::{InstanceState, InstanceStatus, TargetOutcome};
use crate::error::{EXIT_OK, EXIT_PARTIAL};

/// Outcome of a lifecycle command: one entry per instance per backend step.
#[derive(Debug, Clone)]
pub struct CommandReport {
    /// Command name as typed, e.g. `restart`.
    pub command: &'static str,
    pub outcomes: Vec<TargetOutcome>,
    /// Non-fatal problems, such as an unset optional key.
    pub warnings: Vec<String>,
}

impl CommandReport {
    pub fn new(command: &'static str) -> Self {
        Self {
            command,
            outcomes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_outcomes(command: &'static str, outcomes: Vec<TargetOutcome>) -> Self {
        Self {
            command,
            outcomes,
            warnings: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }
}

/// Result of `status`.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub statuses: Vec<InstanceStatus>,
}

impl StatusReport {
    /// Explicitly requested instances that are not installed.
    pub fn missing(&self) -> impl Iterator<Item = &InstanceStatus> {
        self.statuses
            .iter()
            .filter(|s| s.state == InstanceState::Uninstalled)
    }

    pub fn exit_code(&self) -> u8 {
        if self.missing().next().is_some() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }
}
