//! Error types for dispatch and per-target backend failures.

use thiserror::Error;

/// Exit status when every resolved target succeeded.
pub const EXIT_OK: u8 = 0;
/// Exit status when at least one target failed after being attempted.
pub const EXIT_PARTIAL: u8 = 1;
/// Exit status when the command was rejected before any backend call.
pub const EXIT_USAGE: u8 = 2;
/// Exit status when the backend or the KV store could not be reached.
pub const EXIT_UNAVAILABLE: u8 = 3;

pub type Result<T> = std::result::Result<T, Error>;

/// Command-level failures. None of these leave partial progress behind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Argument(String),

    #[error("invalid target '{token}': expected <component> or <component>@<number>")]
    InvalidTargetSyntax { token: String },

    #[error(
        "invalid value '{0}' for --router-mesh-size: make sure the value is an integer between 1 and 255"
    )]
    InvalidRouterMeshSize(String),

    #[error("missing required key {path}, use: deisctl config {component} set {key}=<value>")]
    MissingRequiredKey {
        path: String,
        component: String,
        key: String,
    },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Argument(_)
            | Self::InvalidTargetSyntax { .. }
            | Self::InvalidRouterMeshSize(_)
            | Self::MissingRequiredKey { .. }
            | Self::Settings(_) => EXIT_USAGE,
            Self::BackendUnavailable(_) | Self::Io(_) => EXIT_UNAVAILABLE,
        }
    }
}

/// Failure of a single target inside a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("component not found")]
    ComponentNotFound,

    #[error("no unit file found for {component}")]
    UnitFileNotFound { component: String },

    #[error("target is not running")]
    TargetNotRunning,

    #[error("{component} cannot be scaled")]
    NotScalable { component: String },

    #[error("command exited with status {status}")]
    CommandFailed { status: i32 },

    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_usage_status() {
        let err = Error::InvalidTargetSyntax {
            token: "Router@".to_string(),
        };
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert_eq!(
            Error::InvalidRouterMeshSize("0".to_string()).exit_code(),
            EXIT_USAGE
        );
    }

    #[test]
    fn unreachable_backend_maps_to_unavailable_status() {
        let err = Error::unavailable("connection refused");
        assert_eq!(err.exit_code(), EXIT_UNAVAILABLE);
        assert_eq!(err.to_string(), "backend unavailable: connection refused");
    }
}
