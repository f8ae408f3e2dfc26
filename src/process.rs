//! External command execution
//!
//! Every external tool (zfs, mount, borg, ssh, hook scripts) is run through
//! a `CommandRunner`, which turns a `CommandSpec` into a structured
//! `CommandOutput`. The adapters in `providers` only build specs and
//! interpret outputs, so they can be tested against a recording runner.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{ZborgError, ZborgResult};

/// A fully described external command
#[derive(Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment additions; values are never logged
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Let the child write straight to our stdout/stderr instead of capturing
    pub inherit_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("cwd", &self.cwd)
            .field("inherit_output", &self.inherit_output)
            .finish()
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 when the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turn a non-zero exit into a `Command` error
    pub fn check(self, spec: &CommandSpec) -> ZborgResult<Self> {
        self.check_with(spec, 0)
    }

    /// Like `check`, but exit codes up to `max_ok` also count as success
    ///
    /// borg exits with 1 for warnings (e.g. a file vanished mid-archive).
    pub fn check_with(self, spec: &CommandSpec, max_ok: i32) -> ZborgResult<Self> {
        if (0..=max_ok).contains(&self.status) {
            Ok(self)
        } else {
            Err(ZborgError::Command {
                program: spec.program.clone(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }

    /// Non-empty stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Runs external commands
pub trait CommandRunner {
    /// Run a command to completion
    ///
    /// A non-zero exit is *not* an error here; only failing to start the
    /// process is.
    fn run(&self, spec: &CommandSpec) -> ZborgResult<CommandOutput>;
}

/// Runs commands on the host with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> ZborgResult<CommandOutput> {
        debug!(command = %spec, "running");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        if spec.inherit_output {
            let status = command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| ZborgError::Io(format!("Failed to start {}: {}", spec.program, e)))?;
            return Ok(CommandOutput {
                status: status.code().unwrap_or(-1),
                ..CommandOutput::default()
            });
        }

        let output = command
            .output()
            .map_err(|e| ZborgError::Io(format!("Failed to start {}: {}", spec.program, e)))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
