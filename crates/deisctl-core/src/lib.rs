//! deisctl Core Library
//!
//! Control-plane dispatch for a platform made of named, independently
//! lifecycle-managed components: target resolution, the pluggable scheduling
//! backend, the component configuration protocol and unit definition sources.

pub mod backend;
pub mod catalog;
pub mod commands;
pub mod error;
pub mod kv;
pub mod settings;
pub mod target;
pub mod units;

/// Re-exports of commonly used types
pub mod prelude {
    // Backends
    pub use crate::backend::{
        Action, Backend, BackendKind, FleetBackend, InstallOptions, InstanceState, InstanceStatus,
        JobOutcome, LocalBackend, TargetOutcome,
    };

    // Commands
    pub use crate::commands::{
        CommandReport, ConfigAction, ConfigReport, DispatchContext, Dispatcher, RouterMeshSize,
        StatusReport,
    };

    // Errors
    pub use crate::error::{Error, Result, TargetError};

    // Configuration
    pub use crate::kv::{EtcdctlStore, FileKvStore, Keyspace, KvStore};
    pub use crate::settings::{KvKind, Settings, SettingsStore};

    // Targets
    pub use crate::target::{Instance, ParseMode, Target};

    // Units
    pub use crate::units::{UnitDefinition, UnitSearchPath};
}
