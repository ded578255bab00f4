//! Keeps cluster namespaces in step with remote branches.

use crate::backend::git::{Git, VcsBackend};
use crate::backend::kubectl::{ClusterBackend, Kubectl};
use crate::error::Result;
use crate::naming::sanitize;
use crate::reconcile::{is_new_namespace, unused_namespaces};
use std::path::PathBuf;

/// Label carried by every namespace created for a branch.
pub const MANAGED_LABEL: &str = "kube-git-syncer=true";

/// Cluster and repository handles used together.
pub struct Syncer {
    cluster: Box<dyn ClusterBackend>,
    vcs: Box<dyn VcsBackend>,
}

impl Syncer {
    /// Use the local `kubectl` and the `git` working tree at `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_backends(
            Box::new(Kubectl::new()?),
            Box::new(Git::new(repo)?),
        ))
    }

    #[must_use]
    pub fn with_backends(cluster: Box<dyn ClusterBackend>, vcs: Box<dyn VcsBackend>) -> Self {
        Self { cluster, vcs }
    }

    pub fn cluster(&self) -> &dyn ClusterBackend {
        self.cluster.as_ref()
    }

    /// Prune deleted remote branches and pull in full history.
    ///
    /// Unshallowing fails on a repository that is already complete, so only
    /// the prune is required to succeed.
    pub fn sync_remote(&self) -> Result<()> {
        self.vcs.fetch(true, false)?;
        if let Err(e) = self.vcs.fetch(true, true) {
            log::debug!("Skipping unshallow: {e}");
        }
        Ok(())
    }

    /// Delete every managed namespace whose branch is gone.
    ///
    /// `on_deleted` sees each namespace right after it is removed. The first
    /// failed deletion stops the run. Returns the deleted namespaces.
    pub fn cleanup_namespaces(&self, mut on_deleted: impl FnMut(&str)) -> Result<Vec<String>> {
        self.sync_remote()?;

        let branches = self.vcs.remote_branches()?;
        let namespaces = self.cluster.namespaces(&[MANAGED_LABEL])?;

        let mut deleted = Vec::new();
        for namespace in unused_namespaces(&branches, &namespaces) {
            self.cluster.delete_namespace(&namespace)?;
            on_deleted(&namespace);
            deleted.push(namespace);
        }

        Ok(deleted)
    }

    /// Whether `branch` has no namespace in the cluster yet.
    pub fn is_new_namespace(&self, branch: &str) -> Result<bool> {
        let live = self.cluster.namespaces(&[])?;
        Ok(is_new_namespace(branch, &live))
    }

    /// Create the namespace for `branch` with the managed label.
    ///
    /// Returns the sanitized namespace name.
    pub fn ensure_namespace(&self, branch: &str) -> Result<String> {
        let namespace = sanitize(branch);
        if self.is_new_namespace(&namespace)? {
            self.cluster
                .create_namespace(&namespace, Some(MANAGED_LABEL))?;
        } else {
            log::debug!("Namespace {namespace} already exists");
        }
        Ok(namespace)
    }

    /// Folders with changes between `branch` (or `HEAD`) and `since`.
    ///
    /// The branch is checked out first so that it exists locally for the
    /// diff.
    pub fn changed_folders<'a>(
        &self,
        folders: &[&'a str],
        branch: Option<&str>,
        since: &str,
    ) -> Result<Vec<&'a str>> {
        self.sync_remote()?;

        if let Some(branch) = branch {
            self.vcs.checkout(branch)?;
        }
        let current = branch.unwrap_or("HEAD");

        let mut changed = Vec::new();
        for folder in folders {
            if self.vcs.folder_changed(folder, current, since)? {
                changed.push(*folder);
            }
        }

        log::info!("Changed folders since {since}: {changed:?}");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::git::MockVcs;
    use crate::backend::kubectl::MockCluster;
    use crate::Error;

    fn syncer(cluster: &MockCluster, vcs: &MockVcs) -> Syncer {
        Syncer::with_backends(Box::new(cluster.clone()), Box::new(vcs.clone()))
    }

    #[test]
    fn test_cleanup_deletes_unused_managed_namespaces() {
        let cluster = MockCluster::new();
        cluster.add_namespace("default", &[]);
        cluster.add_namespace("master", &[MANAGED_LABEL]);
        cluster.add_namespace("feature-x", &[MANAGED_LABEL]);
        cluster.add_namespace("old-branch", &[MANAGED_LABEL]);
        let vcs = MockVcs::new(&["master", "Feature/X"]);

        let mut printed = Vec::new();
        let deleted = syncer(&cluster, &vcs)
            .cleanup_namespaces(|ns| printed.push(ns.to_string()))
            .unwrap();

        assert_eq!(deleted, vec!["old-branch"]);
        assert_eq!(printed, vec!["old-branch"]);
        assert!(cluster.has_namespace("default"));
        assert!(!cluster.has_namespace("old-branch"));
    }

    #[test]
    fn test_cleanup_tolerates_complete_history() {
        let cluster = MockCluster::new();
        let vcs = MockVcs::new(&["master"]);
        vcs.fail_on("fetch --prune --unshallow");

        let deleted = syncer(&cluster, &vcs).cleanup_namespaces(|_| {}).unwrap();

        assert!(deleted.is_empty());
        assert_eq!(
            vcs.actions(),
            vec!["fetch --prune", "fetch --prune --unshallow", "branch -r"]
        );
    }

    #[test]
    fn test_cleanup_stops_at_first_failure() {
        let cluster = MockCluster::new();
        cluster.add_namespace("a", &[MANAGED_LABEL]);
        cluster.add_namespace("b", &[MANAGED_LABEL]);
        cluster.fail_on("delete namespace a");
        let vcs = MockVcs::new(&[]);

        let err = syncer(&cluster, &vcs)
            .cleanup_namespaces(|_| {})
            .unwrap_err();

        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(cluster.has_namespace("b"));
    }

    #[test]
    fn test_is_new_namespace() {
        let cluster = MockCluster::new();
        cluster.add_namespace("feature-x", &[]);
        let syncer = syncer(&cluster, &MockVcs::new(&[]));

        assert!(!syncer.is_new_namespace("Feature/X").unwrap());
        assert!(syncer.is_new_namespace("feature/y").unwrap());
    }

    #[test]
    fn test_ensure_namespace_creates_once() {
        let cluster = MockCluster::new();
        let syncer = syncer(&cluster, &MockVcs::new(&[]));

        assert_eq!(syncer.ensure_namespace("Feature/Y").unwrap(), "feature-y");
        assert_eq!(syncer.ensure_namespace("feature-y").unwrap(), "feature-y");

        assert_eq!(cluster.actions(), vec!["create namespace feature-y"]);
        assert_eq!(
            cluster.namespaces(&[MANAGED_LABEL]).unwrap(),
            vec!["feature-y"]
        );
    }

    #[test]
    fn test_changed_folders() {
        let vcs = MockVcs::new(&[]);
        vcs.change("web");
        let syncer = syncer(&MockCluster::new(), &vcs);

        let changed = syncer
            .changed_folders(&["api", "web"], Some("feature-x"), "master")
            .unwrap();

        assert_eq!(changed, vec!["web"]);
        assert!(vcs.actions().contains(&"checkout feature-x".to_string()));
        assert!(vcs.actions().contains(&"diff feature-x master -- api".to_string()));
    }

    #[test]
    fn test_changed_folders_defaults_to_head() {
        let vcs = MockVcs::new(&[]);
        let syncer = syncer(&MockCluster::new(), &vcs);

        assert!(syncer.changed_folders(&["web"], None, "master").unwrap().is_empty());
        assert!(vcs.actions().contains(&"diff HEAD master -- web".to_string()));
    }
}
