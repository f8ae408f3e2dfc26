//! ssh access to the remote destination host

use super::{shell_quote, RemoteShell};
use crate::error::ZborgResult;
use crate::models::RemoteLocation;
use crate::process::{CommandRunner, CommandSpec};

/// `RemoteShell` over the OpenSSH client
pub struct SshShell<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> SshShell<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn command(&self, location: &RemoteLocation, remote_command: String) -> CommandSpec {
        let mut spec = CommandSpec::new("ssh").args(["-o", "BatchMode=yes"]);
        if let Some(port) = location.port {
            spec = spec.arg("-p").arg(port.to_string());
        }
        spec.arg(&location.host).arg("--").arg(remote_command)
    }
}

impl RemoteShell for SshShell<'_> {
    fn directory_exists(&self, location: &RemoteLocation) -> ZborgResult<bool> {
        let spec = self.command(
            location,
            format!("test -d {}", shell_quote(&location.shell_path())),
        );
        let output = self.runner.run(&spec)?;
        match output.status {
            0 => Ok(true),
            1 => Ok(false),
            // 255 is ssh itself failing to connect
            _ => output.check(&spec).map(|_| false),
        }
    }

    fn create_directory(&self, location: &RemoteLocation) -> ZborgResult<()> {
        let spec = self.command(
            location,
            format!("mkdir -p {}", shell_quote(&location.shell_path())),
        );
        self.runner.run(&spec)?.check(&spec).map(|_| ())
    }
}
