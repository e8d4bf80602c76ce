//! Target resolution: turns `router`, `router@3` or `router=3` tokens into
//! canonical component/instance sets.
//!
//! The `@N` suffix means two different things depending on the command:
//! `scale router@3` asks for three routers, while `stop router@3` addresses the
//! third one. Callers pick the meaning explicitly with [`ParseMode`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{self, PLATFORM_TOKEN};
use crate::error::{Error, Result};

/// Largest instance count `scale` accepts, matching the router mesh bound.
pub const MAX_SCALE: u32 = 255;

/// How the numeric suffix of a target token is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// `name@N` addresses instance `N`.
    Address,
    /// `name@N` (or `name=N`) requests `N` running instances.
    Scale,
}

/// A component together with the instances a command applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub component: String,
    /// 1-based, sorted, unique.
    pub instances: Vec<u32>,
}

impl Target {
    pub fn new(component: impl Into<String>, instances: impl IntoIterator<Item = u32>) -> Self {
        let mut instances: Vec<u32> = instances.into_iter().collect();
        instances.sort_unstable();
        instances.dedup();
        Self {
            component: component.into(),
            instances,
        }
    }

    /// A target covering instances `1..=count`.
    pub fn with_count(component: impl Into<String>, count: u32) -> Self {
        Self::new(component, 1..=count)
    }

    pub fn count(&self) -> u32 {
        u32::try_from(self.instances.len()).unwrap_or(u32::MAX)
    }

    pub fn instances(&self) -> impl Iterator<Item = Instance> + '_ {
        self.instances
            .iter()
            .map(|&index| Instance::new(self.component.clone(), index))
    }

    /// Serialise back into tokens that resolve to the same target in `mode`.
    pub fn to_tokens(&self, mode: ParseMode) -> Vec<String> {
        match mode {
            ParseMode::Scale => vec![format!("{}@{}", self.component, self.count())],
            ParseMode::Address => self
                .instances
                .iter()
                .map(|index| format!("{}@{}", self.component, index))
                .collect(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instances == [1] && !catalog::is_scalable(&self.component) {
            return write!(f, "{}", self.component);
        }
        let indexes: Vec<String> = self.instances.iter().map(u32::to_string).collect();
        write!(f, "{}@{}", self.component, indexes.join(","))
    }
}

/// One instance of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    pub component: String,
    pub index: u32,
}

impl Instance {
    pub fn new(component: impl Into<String>, index: u32) -> Self {
        Self {
            component: component.into(),
            index,
        }
    }

    fn is_templated(&self) -> bool {
        self.index != 1 || catalog::is_scalable(&self.component)
    }

    /// Scheduler unit name, e.g. `deis-router@2.service` or `deis-controller.service`.
    pub fn unit_name(&self) -> String {
        if self.is_templated() {
            format!("deis-{}@{}.service", self.component, self.index)
        } else {
            format!("deis-{}.service", self.component)
        }
    }

    /// Container name on the hosting machine.
    pub fn container_name(&self) -> String {
        if self.is_templated() {
            format!("deis-{}-{}", self.component, self.index)
        } else {
            format!("deis-{}", self.component)
        }
    }

    /// Inverse of [`Instance::unit_name`]; `None` for units deisctl does not manage.
    pub fn from_unit_name(unit: &str) -> Option<Self> {
        let stem = unit.strip_prefix("deis-")?.strip_suffix(".service")?;
        match stem.split_once('@') {
            Some((component, index)) => {
                let index = parse_positive(index)?;
                valid_name(component).then(|| Self::new(component, index))
            }
            None => valid_name(stem).then(|| Self::new(stem, 1)),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_templated() {
            write!(f, "{}@{}", self.component, self.index)
        } else {
            write!(f, "{}", self.component)
        }
    }
}

/// True when the tokens address the whole platform: no tokens, or only `platform`.
pub fn is_whole_platform(tokens: &[String]) -> bool {
    tokens.iter().all(|t| t == PLATFORM_TOKEN)
}

/// Resolve target tokens against the currently installed targets.
///
/// An empty token list resolves to everything installed. Unknown components
/// are passed through untouched; only the syntax is validated here.
pub fn resolve(tokens: &[String], mode: ParseMode, installed: &[Target]) -> Result<Vec<Target>> {
    if tokens.is_empty() {
        let mut all = installed.to_vec();
        all.sort_by_key(|t| catalog::order(&t.component));
        return Ok(all);
    }

    // Validate every token before building anything.
    let parsed = tokens
        .iter()
        .map(|token| parse_token(token, mode))
        .collect::<Result<Vec<_>>>()?;

    let mut resolved: Vec<Target> = Vec::new();
    for (component, number) in parsed {
        let instances: Vec<u32> = match (mode, number) {
            (ParseMode::Scale, Some(count)) => (1..=count).collect(),
            (ParseMode::Address, Some(index)) => vec![index],
            (ParseMode::Address, None) => installed
                .iter()
                .find(|t| t.component == component)
                .map(|t| t.instances.clone())
                .filter(|instances| !instances.is_empty())
                .unwrap_or_else(|| vec![1]),
            (ParseMode::Scale, None) => {
                return Err(Error::InvalidTargetSyntax { token: component });
            }
        };

        match resolved.iter_mut().find(|t| t.component == component) {
            // The last count wins when scaling; addressed instances accumulate.
            Some(existing) if mode == ParseMode::Scale => existing.instances = instances,
            Some(existing) => {
                *existing = Target::new(
                    component,
                    existing.instances.iter().copied().chain(instances),
                );
            }
            None => resolved.push(Target::new(component, instances)),
        }
    }
    Ok(resolved)
}

fn parse_token(token: &str, mode: ParseMode) -> Result<(String, Option<u32>)> {
    let invalid = || Error::InvalidTargetSyntax {
        token: token.to_string(),
    };

    let (name, number) = match token.split_once('@') {
        Some((name, number)) => (name, Some(number)),
        None => match token.split_once('=') {
            Some((name, number)) if mode == ParseMode::Scale => (name, Some(number)),
            _ => (token, None),
        },
    };

    if !valid_name(name) {
        return Err(invalid());
    }
    let number = match number {
        Some(raw) => {
            let number = parse_positive(raw).ok_or_else(invalid)?;
            if mode == ParseMode::Scale && number > MAX_SCALE {
                return Err(invalid());
            }
            Some(number)
        }
        None if mode == ParseMode::Scale => return Err(invalid()),
        None => None,
    };
    Ok((name.to_string(), number))
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn parse_positive(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().filter(|n| *n > 0)
}
