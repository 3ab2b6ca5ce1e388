// SPDX-License-Identifier: GPL-3.0-only

//! Execution of the LVM command-line tools
//!
//! Every mutation and every property read in this crate bottoms out in
//! one invocation here. The runner is a trait so tests can substitute
//! canned report output without spawning processes.

use std::process::Command;

use tracing::{debug, warn};
use which::which;

use crate::error::{LvmError, Result};

/// The LVM subcommands this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LvmCommand {
    Lvs,
    Vgs,
    Lvcreate,
    Lvchange,
    Lvremove,
    Lvrename,
    Lvextend,
    Vgcreate,
    Vgchange,
    Lvmconfig,
}

impl LvmCommand {
    /// Name of the binary implementing the subcommand.
    pub fn binary(self) -> &'static str {
        match self {
            LvmCommand::Lvs => "lvs",
            LvmCommand::Vgs => "vgs",
            LvmCommand::Lvcreate => "lvcreate",
            LvmCommand::Lvchange => "lvchange",
            LvmCommand::Lvremove => "lvremove",
            LvmCommand::Lvrename => "lvrename",
            LvmCommand::Lvextend => "lvextend",
            LvmCommand::Vgcreate => "vgcreate",
            LvmCommand::Vgchange => "vgchange",
            LvmCommand::Lvmconfig => "lvmconfig",
        }
    }
}

/// Executes external commands on behalf of the volume models.
///
/// `invoke` covers the LVM subcommands; `run` covers the handful of
/// host utilities cleanup needs (`sync`, `umount`, `pkill`). Neither
/// retries: a non-zero exit is surfaced as
/// [`LvmError::CommandFailed`] and the caller decides what is fatal.
pub trait CommandRunner: Send + Sync {
    /// Run an LVM subcommand, returning its raw standard output.
    fn invoke(&self, command: LvmCommand, args: &[&str]) -> Result<String>;

    /// Run a host utility, returning its raw standard output.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Runs the real LVM tools found on `PATH`.
pub struct SystemRunner;

impl SystemRunner {
    /// Create a runner, verifying the LVM report tools are installed.
    pub fn new() -> Result<Self> {
        for tool in ["lvs", "vgs"] {
            which(tool).map_err(|_| LvmError::ToolNotFound(tool.to_string()))?;
        }
        Ok(Self)
    }
}

fn run_command(program: &str, args: &[&str]) -> Result<String> {
    debug!("Running {program} {args:?}");
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let status = output.status.code().unwrap_or(-1);
        warn!("{program} failed with status {status}: {stderr}");
        return Err(LvmError::CommandFailed {
            command: program.to_string(),
            status,
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

impl CommandRunner for SystemRunner {
    fn invoke(&self, command: LvmCommand, args: &[&str]) -> Result<String> {
        run_command(command.binary(), args)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        run_command(program, args)
    }
}
