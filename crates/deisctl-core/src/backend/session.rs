//! Running remote sessions and log readers as child processes.
//!
//! Interactive children share the terminal's process group, so `^C` from the
//! operator reaches the session directly.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{Result, TargetError};

use super::JobOutcome;

/// Run `command` attached to the current terminal.
pub(crate) fn interactive(mut command: Command) -> JobOutcome {
    tracing::debug!(?command, "Starting interactive session");
    match command.status() {
        Ok(status) if status.success() => JobOutcome::Succeeded,
        Ok(status) => JobOutcome::Failed(TargetError::CommandFailed {
            status: status.code().unwrap_or(-1),
        }),
        Err(e) => JobOutcome::Failed(TargetError::Backend(format!(
            "failed to start session: {e}"
        ))),
    }
}

/// Run `command` to completion and copy its stdout and stderr to `out`.
pub(crate) fn captured(mut command: Command, out: &mut dyn Write) -> Result<JobOutcome> {
    tracing::debug!(?command, "Running command");
    let output = match command.stdin(Stdio::null()).output() {
        Ok(output) => output,
        Err(e) => {
            return Ok(JobOutcome::Failed(TargetError::Backend(format!(
                "failed to run command: {e}"
            ))));
        }
    };
    out.write_all(&output.stdout)?;
    out.write_all(&output.stderr)?;
    out.flush()?;

    if output.status.success() {
        Ok(JobOutcome::Succeeded)
    } else {
        Ok(JobOutcome::Failed(TargetError::CommandFailed {
            status: output.status.code().unwrap_or(-1),
        }))
    }
}
