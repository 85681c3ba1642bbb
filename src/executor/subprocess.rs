//! Direct-exec subprocesses with captured output and an enforced timeout.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CollaboratorErrorKind, ConvergeError};

use super::output::sanitize_output;

/// Lines of stderr kept in error messages.
const ERROR_OUTPUT_LINES: usize = 10;

/// Interval between liveness checks of a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status and captured output of a finished child.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    pub success: bool,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for SubprocessResult {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl SubprocessResult {
    /// Sanitized stderr, falling back to stdout when stderr is empty.
    pub fn diagnostics(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        sanitize_output(text.trim(), ERROR_OUTPUT_LINES)
    }
}

/// A platform tool invocation: program, arguments, extra environment and
/// the time it is allowed to run.
pub struct SubprocessBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl SubprocessBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn arg(self, arg: &str) -> Self {
        self.args([arg])
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line as it would be typed, for error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the program with stdin closed and wait for it.
    ///
    /// A child still running at the deadline is killed and reaped, and a
    /// `Timeout` collaborator error is returned.
    pub fn run(self) -> Result<SubprocessResult, ConvergeError> {
        debug!(
            command = %self.command_line(),
            timeout_secs = self.timeout.as_secs(),
            "Running subprocess"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| execution_failed(format!("cannot spawn {}: {}", self.program, e)))?;

        // Both pipes are read while the child runs so a full pipe buffer
        // cannot stall it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_until(&mut child, started + self.timeout)?;
        let result = SubprocessResult::from(Output {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        });
        debug!(
            program = %self.program,
            exit_code = ?result.exit_code,
            elapsed_ms = started.elapsed().as_millis(),
            "Subprocess finished"
        );
        Ok(result)
    }

    fn wait_until(
        &self,
        child: &mut Child,
        deadline: Instant,
    ) -> Result<ExitStatus, ConvergeError> {
        loop {
            let exited = child.try_wait().map_err(|e| {
                execution_failed(format!("cannot poll {}: {}", self.program, e))
            })?;

            if let Some(status) = exited {
                return Ok(status);
            }

            if Instant::now() >= deadline {
                warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs(),
                    "Subprocess exceeded its timeout, killing"
                );
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill subprocess");
                }
                let _ = child.wait();
                // Readers are left detached: a surviving grandchild may
                // still hold the pipes open.
                return Err(ConvergeError::Collaborator {
                    kind: CollaboratorErrorKind::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    },
                });
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run and treat a non-zero exit as an `ExecutionFailed` error carrying
    /// the command line and sanitized diagnostics.
    pub fn run_checked(self) -> Result<SubprocessResult, ConvergeError> {
        let command_line = self.command_line();
        let result = self.run()?;
        if result.success {
            return Ok(result);
        }
        Err(execution_failed(format!(
            "`{}` exited with {:?}: {}",
            command_line,
            result.exit_code,
            result.diagnostics()
        )))
    }
}

/// Shorthand for a builder with only arguments and a timeout.
pub fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<SubprocessResult, ConvergeError> {
    SubprocessBuilder::new(program)
        .args(args)
        .timeout(timeout)
        .run()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}

fn execution_failed(message: String) -> ConvergeError {
    ConvergeError::Collaborator {
        kind: CollaboratorErrorKind::ExecutionFailed { message },
    }
}
