//! Backends for the cluster and version-control collaborators.
//!
//! - [`kubectl`]: namespaces, manifests and secrets
//! - [`git`]: remote branches and folder diffs
//! - [`helm`]: manifest rendering
//!
//! The two traits each come with an in-memory mock for tests.

pub mod git;
pub mod helm;
pub mod kubectl;

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// A located executable.
pub(crate) struct Tool {
    name: &'static str,
    path: PathBuf,
}

impl Tool {
    /// Find `name` in PATH.
    pub(crate) fn locate(name: &'static str) -> Result<Self> {
        let path = which::which(name).map_err(|_| Error::NotInstalled(name))?;
        Ok(Self { name, path })
    }

    fn command(&self, args: &[String]) -> Command {
        log::debug!("Command: {} {}", self.name, args.join(" "));
        let mut command = Command::new(&self.path);
        command.args(args);
        command
    }

    /// Run with inherited stdio; non-zero exit is an error.
    pub(crate) fn run(&self, args: &[String]) -> Result<()> {
        let status = self
            .command(args)
            .status()
            .map_err(|source| self.spawn_error(args, source))?;

        log::debug!("Command exit code: {:?}", status.code());
        if status.success() {
            Ok(())
        } else {
            Err(self.failure(args, String::new()))
        }
    }

    /// Run silently and report whether it succeeded.
    pub(crate) fn succeeds(&self, args: &[String]) -> Result<bool> {
        let status = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| self.spawn_error(args, source))?;

        log::debug!("Command exit code: {:?}", status.code());
        Ok(status.success())
    }

    /// Run and return trimmed stdout; non-zero exit is an error.
    pub(crate) fn output(&self, args: &[String]) -> Result<String> {
        let Output {
            status,
            stdout,
            stderr,
        } = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| self.spawn_error(args, source))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(self.failure(args, stderr));
        }

        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        log::debug!("Command output: {stdout}");
        Ok(stdout)
    }

    fn spawn_error(&self, args: &[String], source: std::io::Error) -> Error {
        Error::Spawn {
            binary: self.name,
            command: args.join(" "),
            source,
        }
    }

    fn failure(&self, args: &[String], stderr: String) -> Error {
        Error::CommandFailed {
            binary: self.name,
            command: args.join(" "),
            stderr,
        }
    }
}

/// Build an owned argument list.
pub(crate) fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Lines of tool output with a prefix removed, lowercased, blank lines
/// dropped and sorted.
pub(crate) fn clean_lines(output: &str, prefix: &str) -> Vec<String> {
    let mut lines: Vec<String> = output
        .lines()
        .map(|line| line.trim().to_lowercase().replace(prefix, ""))
        .filter(|line| !line.is_empty())
        .collect();
    lines.sort();
    lines
}
