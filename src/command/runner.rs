use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::{CommandError, CommandOutput, CommandRunner};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs host commands as child processes, capturing their output.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, "running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or(CommandError::StreamPipeError("stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(CommandError::StreamPipeError("stderr".to_string()))?;

        // Pipes are drained on their own threads so a chatty process cannot block on a full buffer
        let stdout_reader = collect_lines(stdout);
        let stderr_reader = collect_lines(stderr);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                warn!(program, ?timeout, "command timed out, killing it");
                if let Err(e) = child.kill() {
                    error!(program, "could not kill timed out command: {}", e);
                }
                // reap the process so it does not linger as a zombie
                match child.wait() {
                    // the readers end once the killed process closes its pipes
                    Ok(_) => {
                        join_lines(stdout_reader);
                        join_lines(stderr_reader);
                    }
                    Err(e) => error!(program, "could not reap timed out command: {}", e),
                }
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: join_lines(stdout_reader),
            stderr: join_lines(stderr_reader),
        })
    }
}

fn collect_lines<R>(stream: R) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        BufReader::new(stream)
            .lines()
            .map_while(Result::ok)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn join_lines(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_else(|_| {
        error!("output reader thread panicked");
        String::new()
    })
}
