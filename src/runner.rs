use anyhow::{Context, Result, bail};
use std::process::{Command, Stdio};

fn command(cmd: &str, args: &[&str]) -> Command {
    log::debug!("Command: {} {}", cmd, args.join(" "));
    let mut command = Command::new(cmd);
    command.args(args);
    command
}

/// Run a command with inherited stdio and fail unless it exits successfully
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    let status = command(cmd, args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    log::debug!("Command exit code: {:?}", status.code());
    if !status.success() {
        bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = command(cmd, args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command and capture stdout and stderr together, whatever the exit status
pub fn run_combined(cmd: &str, args: &[&str]) -> Result<String> {
    let output = command(cmd, args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(!command_exists("kubails-definitely-not-installed"));
    }

    #[test]
    fn test_run_missing_binary_is_error() {
        let err = run_checked("kubails-definitely-not-installed", &["x"]).unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[test]
    fn test_capture_missing_binary_is_error() {
        assert!(run_capture("kubails-definitely-not-installed", &[]).is_err());
    }
}
