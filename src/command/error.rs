use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("process not started")]
    ProcessNotStarted,

    #[error("`{0}` not piped")]
    StreamPipeError(String),

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("io error: `{0}`")]
    IOError(#[from] std::io::Error),
}
