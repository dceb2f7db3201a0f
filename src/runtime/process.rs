//! Shell command execution.
//!
//! Commands are handed to the platform shell as a single string so that
//! redirections in installer command lines keep working.

use anyhow::{Context, Result};
use log::debug;
use std::process::{Command, Stdio};

use super::{CommandOutput, RealRuntime};

fn shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn run_impl(&self, command: &str) -> Result<i32> {
        debug!("Running: {}", command);
        let status = shell(command)
            .status()
            .with_context(|| format!("Failed to spawn shell for `{}`", command))?;
        Ok(status.code().unwrap_or(-1))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn run_capture_impl(&self, command: &str) -> Result<CommandOutput> {
        debug!("Running (captured): {}", command);
        let output = shell(command)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to spawn shell for `{}`", command))?;
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
