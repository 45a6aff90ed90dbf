use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::{debug, error, info, warn};

/// One compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CompileCommand {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for CompileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success,
    Failure,
}

impl ProcessOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ProcessOutcome::Success)
    }
}

/// Runs a single command to completion.
///
/// Called concurrently from every pool worker, so implementations must not
/// rely on exclusive access.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &CompileCommand) -> ProcessOutcome;
}

/// Spawns the external compiler and maps its exit status to an outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerRunner;

impl ProcessRunner for CompilerRunner {
    fn run(&self, command: &CompileCommand) -> ProcessOutcome {
        debug!(script = %command.label, command = %command, "Starting compiler");

        let output = match Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(err) => {
                error!(
                    script = %command.label,
                    program = %command.program.display(),
                    error = %err,
                    "Failed to spawn compiler"
                );
                return ProcessOutcome::Failure;
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(script = %command.label, "{line}");
        }

        if output.status.success() {
            info!(script = %command.label, "Compiled");
            ProcessOutcome::Success
        } else {
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!(script = %command.label, "{line}");
            }
            error!(
                script = %command.label,
                exit_code = output.status.code().unwrap_or(-1),
                "Compilation failed"
            );
            ProcessOutcome::Failure
        }
    }
}
