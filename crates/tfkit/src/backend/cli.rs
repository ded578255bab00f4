//! Real Terraform CLI backend.

use crate::backend::{Backend, Env};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Executable this backend drives.
pub const BINARY: &str = "terraform";

/// Backend that executes the `terraform` binary.
pub struct CliBackend {
    terraform_path: PathBuf,
}

impl CliBackend {
    /// Locate `terraform` in PATH.
    pub fn new() -> Result<Self> {
        let terraform_path = which::which(BINARY).map_err(|_| Error::NotInstalled)?;
        Ok(Self { terraform_path })
    }

    fn command(&self, dir: &Path, args: &[String]) -> Result<Command> {
        if !dir.is_dir() {
            return Err(Error::MissingDirectory(dir.to_path_buf()));
        }

        log::debug!("Command: terraform {} (in {})", args.join(" "), dir.display());
        let mut command = Command::new(&self.terraform_path);
        command.args(args).current_dir(dir);
        Ok(command)
    }
}

impl Backend for CliBackend {
    fn run(&self, dir: &Path, args: &[String], env: &Env) -> Result<()> {
        let status = self
            .command(dir, args)?
            .envs(env)
            .status()
            .map_err(|source| Error::Spawn {
                command: args.join(" "),
                source,
            })?;

        log::debug!("Command exit code: {:?}", status.code());
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: args.join(" "),
                code: status.code(),
                stderr: String::new(),
            })
        }
    }

    fn output(&self, dir: &Path, args: &[String]) -> Result<String> {
        let output = self
            .command(dir, args)?
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                command: args.join(" "),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        log::debug!("Command output: {stdout}");
        Ok(stdout)
    }
}
