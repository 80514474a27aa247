use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

use crate::command::CommandError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PackageError {
    #[error("package `{0}` not found")]
    NotFound(String),

    #[error("permission denied: `{0}`")]
    PermissionDenied(String),

    #[error("requested version is not available: `{0}`")]
    VersionUnavailable(String),

    #[error("temporary failure talking to the package manager: `{0}`")]
    TransientIO(String),

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` failed: `{reason}`")]
    CommandFailed { command: String, reason: String },

    #[error("unexpected package manager output: `{0}`")]
    UnexpectedOutput(String),
}

impl PackageError {
    /// Only transient failures are worth retrying without a change of input.
    pub fn is_transient(&self) -> bool {
        matches!(self, PackageError::TransientIO(_))
    }

    /// Classifies the standard error of a failed package manager command.
    pub fn from_stderr(command: &str, stderr: &str) -> Self {
        let reason = stderr.trim().to_string();
        let lower = reason.to_lowercase();

        if lower.contains("not available") || lower.contains("no revision") {
            PackageError::VersionUnavailable(reason)
        } else if lower.contains("not found")
            || lower.contains("is not installed")
            || lower.contains("no matching snaps")
        {
            PackageError::NotFound(reason)
        } else if lower.contains("permission denied") || lower.contains("access denied") {
            PackageError::PermissionDenied(reason)
        } else if lower.contains("cannot communicate")
            || lower.contains("timeout")
            || lower.contains("temporary")
            || lower.contains("change in progress")
        {
            PackageError::TransientIO(reason)
        } else {
            PackageError::CommandFailed {
                command: command.to_string(),
                reason,
            }
        }
    }

    pub fn from_command_error(command: &str, err: CommandError) -> Self {
        match err {
            CommandError::Timeout { timeout, .. } => PackageError::Timeout {
                command: command.to_string(),
                timeout,
            },
            CommandError::IOError(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                PackageError::PermissionDenied(e.to_string())
            }
            other => PackageError::CommandFailed {
                command: command.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
