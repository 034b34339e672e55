//! External command execution.
//!
//! All system tools are invoked through the [`Runner`] trait so that the
//! parsers and command lines in this crate can be tested with scripted
//! output instead of a live system.

use crate::error::{Error, Result};
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into a categorized error.
    pub fn check(self, program: &str, subject: Option<&str>) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let stderr = if self.stderr.trim().is_empty() {
                format!("exited with {}", self.exit_label())
            } else {
                self.stderr.clone()
            };
            Err(Error::from_command_output(program, &stderr, subject))
        }
    }

    fn exit_label(&self) -> String {
        match self.code {
            Some(code) => format!("status {code}"),
            None => "a signal".to_string(),
        }
    }
}

/// Executes external programs.
///
/// `run` is used for read-only queries; `run_privileged` for commands that
/// change system state and may need elevated privileges.
pub trait Runner: Send + Sync {
    /// Run a program and capture its output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a state-changing program.
    fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run(program, args)
    }
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        (**self).run(program, args)
    }

    fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        (**self).run_privileged(program, args)
    }
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    sudo: bool,
}

impl SystemRunner {
    /// Create a runner that executes everything as the current user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix state-changing commands with non-interactive `sudo -n`.
    ///
    /// Credentials must already be cached (see [`SystemRunner::validate_sudo`]).
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Whether state-changing commands go through sudo.
    pub fn uses_sudo(&self) -> bool {
        self.sudo
    }

    /// Prompt for the sudo password once, with the terminal attached.
    pub fn validate_sudo(&self) -> Result<()> {
        if !self.sudo {
            return Ok(());
        }

        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .map_err(|e| spawn_error("sudo", e))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Permission {
                message: "failed to acquire sudo privileges".to_string(),
            })
        }
    }
}

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("exec: {} {}", program, args.join(" "));

        // Own process group: a terminal Ctrl-C reaches converge only, and
        // the command runs to completion.
        let output = Command::new(program)
            .args(args)
            .process_group(0)
            .output()
            .map_err(|e| spawn_error(program, e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        if !self.sudo {
            return self.run(program, args);
        }

        let mut sudo_args = vec!["-n", program];
        sudo_args.extend_from_slice(args);
        self.run("sudo", &sudo_args)
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::CommandMissing {
            program: program.to_string(),
        }
    } else {
        Error::CommandFailed {
            message: format!("failed to execute {program}"),
            stderr: e.to_string(),
        }
    }
}
