//! Backend abstraction for running Terraform.
//!
//! The [`Backend`] trait is the seam between the [`crate::Terraform`]
//! client and the `terraform` executable. [`cli::CliBackend`] runs the real
//! binary; [`MockBackend`] records invocations and replays canned output
//! for tests.

pub mod cli;

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Environment variables added on top of the inherited environment.
pub type Env = BTreeMap<String, String>;

/// Backend trait for Terraform invocations.
pub trait Backend: Send + Sync {
    /// Run `terraform <args>` in `dir` with inherited stdio.
    fn run(&self, dir: &Path, args: &[String], env: &Env) -> Result<()>;

    /// Run `terraform <args>` in `dir` and return its trimmed stdout.
    fn output(&self, dir: &Path, args: &[String]) -> Result<String>;
}

/// One recorded call to a [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub dir: PathBuf,
    pub args: Vec<String>,
    pub env: Env,
}

/// In-memory backend for tests.
///
/// Outputs are keyed by the space-joined argument list, e.g.
/// `"output -json cluster_name"`. Unknown `output` calls return an empty
/// string, the same as Terraform printing nothing.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    outputs: Arc<Mutex<HashMap<String, String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stdout returned for an argument list.
    pub fn set_output(&self, args: &str, stdout: impl Into<String>) {
        self.outputs.lock().unwrap().insert(args.to_string(), stdout.into());
    }

    /// Make every call whose first argument is `subcommand` fail.
    pub fn fail_on(&self, subcommand: &str) {
        self.failing.lock().unwrap().insert(subcommand.to_string());
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, dir: &Path, args: &[String], env: &Env) -> Result<()> {
        self.calls.lock().unwrap().push(Invocation {
            dir: dir.to_path_buf(),
            args: args.to_vec(),
            env: env.clone(),
        });

        let subcommand = args.first().cloned().unwrap_or_default();
        if self.failing.lock().unwrap().contains(&subcommand) {
            return Err(Error::CommandFailed {
                command: args.join(" "),
                code: Some(1),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    fn run(&self, dir: &Path, args: &[String], env: &Env) -> Result<()> {
        self.record(dir, args, env)
    }

    fn output(&self, dir: &Path, args: &[String]) -> Result<String> {
        self.record(dir, args, &Env::new())?;
        let outputs = self.outputs.lock().unwrap();
        Ok(outputs.get(&args.join(" ")).cloned().unwrap_or_default())
    }
}
