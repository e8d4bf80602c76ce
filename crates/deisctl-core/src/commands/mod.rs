//! High-level commands behind the `deisctl` CLI.
//!
//! [`DispatchContext`] turns settings into a [`Dispatcher`]; the dispatcher
//! exposes one method per command and returns plain reports the CLI renders.

pub mod config;
pub mod context;
pub mod dispatch;
mod mesh;
pub mod report;

pub use config::{ConfigAction, ConfigEntry, ConfigReport, KeyFailure, SSH_PRIVATE_KEY};
pub use context::DispatchContext;
pub use dispatch::{Dispatcher, platform_targets};
pub use mesh::RouterMeshSize;
pub use report::{CommandReport, StatusReport};
