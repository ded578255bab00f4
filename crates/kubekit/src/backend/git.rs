//! Version control access through `git`.

use super::{Tool, args, clean_lines};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Executable this backend drives.
pub const BINARY: &str = "git";

const REMOTE_PREFIX: &str = "origin/";

/// Repository operations.
pub trait VcsBackend: Send + Sync {
    /// Fetch from the default remote.
    fn fetch(&self, prune: bool, unshallow: bool) -> Result<()>;

    /// Remote branch names without the `origin/` prefix, lowercased and
    /// sorted. Symbolic refs (`origin/HEAD -> origin/master`) are skipped.
    fn remote_branches(&self) -> Result<Vec<String>>;

    fn checkout(&self, branch: &str) -> Result<()>;

    /// Whether anything under `folder` differs between two revisions.
    fn folder_changed(&self, folder: &str, from: &str, to: &str) -> Result<bool>;
}

/// [`VcsBackend`] over the `git` binary, rooted at a working tree.
pub struct Git {
    tool: Tool,
    repo: PathBuf,
}

impl Git {
    /// Locate `git` in PATH and operate on `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            tool: Tool::locate(BINARY)?,
            repo: repo.into(),
        })
    }

    fn in_repo<const N: usize>(&self, items: [&str; N]) -> Vec<String> {
        let mut command = args(["-C"]);
        command.push(self.repo.display().to_string());
        command.extend(args(items));
        command
    }
}

impl VcsBackend for Git {
    fn fetch(&self, prune: bool, unshallow: bool) -> Result<()> {
        let mut command = self.in_repo(["fetch"]);
        if prune {
            command.push("--prune".to_string());
        }
        if unshallow {
            command.push("--unshallow".to_string());
        }
        self.tool.run(&command)
    }

    fn remote_branches(&self) -> Result<Vec<String>> {
        let output = self.tool.output(&self.in_repo(["branch", "-r"]))?;
        Ok(parse_remote_branches(&output))
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.tool.run(&self.in_repo(["checkout", branch]))
    }

    fn folder_changed(&self, folder: &str, from: &str, to: &str) -> Result<bool> {
        let command = self.in_repo(["diff", "--quiet", from, to, "--", folder]);
        Ok(!self.tool.succeeds(&command)?)
    }
}

/// Parse `git branch -r` output.
pub fn parse_remote_branches(output: &str) -> Vec<String> {
    let refs: String = output
        .lines()
        .filter(|line| !line.contains("->"))
        .map(|line| format!("{line}\n"))
        .collect();
    clean_lines(&refs, REMOTE_PREFIX)
}

/// In-memory repository for tests.
#[derive(Debug, Clone, Default)]
pub struct MockVcs {
    branches: Arc<Mutex<Vec<String>>>,
    changed: Arc<Mutex<BTreeSet<String>>>,
    failing: Arc<Mutex<Vec<String>>>,
    actions: Arc<Mutex<Vec<String>>>,
}

impl MockVcs {
    /// Create a repository with the given remote branches.
    #[must_use]
    pub fn new(branches: &[&str]) -> Self {
        let mock = Self::default();
        *mock.branches.lock().unwrap() = branches.iter().map(|b| (*b).to_string()).collect();
        mock
    }

    /// Mark a folder as changed.
    pub fn change(&self, folder: &str) {
        self.changed.lock().unwrap().insert(folder.to_string());
    }

    /// Make any action starting with `prefix` fail.
    pub fn fail_on(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.to_string());
    }

    /// Recorded actions, in order.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) -> Result<()> {
        let failed = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| action.starts_with(prefix.as_str()));
        self.actions.lock().unwrap().push(action.clone());

        if failed {
            return Err(Error::CommandFailed {
                binary: BINARY,
                command: action,
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

impl VcsBackend for MockVcs {
    fn fetch(&self, prune: bool, unshallow: bool) -> Result<()> {
        let mut action = "fetch".to_string();
        if prune {
            action.push_str(" --prune");
        }
        if unshallow {
            action.push_str(" --unshallow");
        }
        self.record(action)
    }

    fn remote_branches(&self) -> Result<Vec<String>> {
        self.record("branch -r".to_string())?;
        let mut branches: Vec<String> = self
            .branches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.to_lowercase())
            .collect();
        branches.sort();
        Ok(branches)
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(format!("checkout {branch}"))
    }

    fn folder_changed(&self, folder: &str, from: &str, to: &str) -> Result<bool> {
        self.record(format!("diff {from} {to} -- {folder}"))?;
        Ok(self.changed.lock().unwrap().contains(folder))
    }
}
