pub mod error;
pub mod runner;

use std::time::Duration;

pub use error::CommandError;
pub use runner::ProcessRunner;

/// Captured result of a finished host command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait that specifies the interface for blocking execution of host commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `program` with `args` until it exits or `timeout` elapses. A command exceeding the
    /// timeout is killed and reported as [`CommandError::Timeout`].
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}
