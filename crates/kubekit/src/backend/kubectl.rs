//! Kubernetes cluster access through `kubectl`.

use super::{Tool, args, clean_lines};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Executable this backend drives.
pub const BINARY: &str = "kubectl";

/// Cluster operations.
pub trait ClusterBackend: Send + Sync {
    /// Namespace names matching every label selector, sorted.
    fn namespaces(&self, labels: &[&str]) -> Result<Vec<String>>;

    /// Create a namespace, then apply `label` (`key=value`) when given.
    fn create_namespace(&self, name: &str, label: Option<&str>) -> Result<()>;

    fn delete_namespace(&self, name: &str) -> Result<()>;

    /// `kubectl apply` a manifest file or directory.
    fn apply(&self, manifests: &Path, recursive: bool) -> Result<()>;

    /// Create a generic secret from a file, or from an env file.
    fn create_secret_from_file(
        &self,
        name: &str,
        source: &str,
        namespace: &str,
        env_file: bool,
    ) -> Result<()>;

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<()>;

    fn create_cluster_role_binding(&self, name: &str, role: &str, user: &str) -> Result<()>;
}

/// [`ClusterBackend`] over the `kubectl` binary.
pub struct Kubectl {
    tool: Tool,
}

impl Kubectl {
    /// Locate `kubectl` in PATH.
    pub fn new() -> Result<Self> {
        Ok(Self {
            tool: Tool::locate(BINARY)?,
        })
    }
}

impl ClusterBackend for Kubectl {
    fn namespaces(&self, labels: &[&str]) -> Result<Vec<String>> {
        let mut command = args(["get", "namespaces", "-o", "name"]);
        for label in labels {
            command.push("-l".to_string());
            command.push((*label).to_string());
        }

        let output = self.tool.output(&command)?;
        Ok(clean_lines(&output, "namespace/"))
    }

    fn create_namespace(&self, name: &str, label: Option<&str>) -> Result<()> {
        self.tool.run(&args(["create", "namespace", name]))?;

        if let Some(label) = label {
            self.tool.run(&args(["label", "namespace", name, label]))?;
        }
        Ok(())
    }

    fn delete_namespace(&self, name: &str) -> Result<()> {
        self.tool.run(&args(["delete", "namespace", name]))
    }

    fn apply(&self, manifests: &Path, recursive: bool) -> Result<()> {
        let mut command = args(["apply"]);
        if recursive {
            command.push("--recursive".to_string());
        }
        command.push("-f".to_string());
        command.push(manifests.display().to_string());

        self.tool.run(&command)
    }

    fn create_secret_from_file(
        &self,
        name: &str,
        source: &str,
        namespace: &str,
        env_file: bool,
    ) -> Result<()> {
        let from = if env_file {
            "--from-env-file"
        } else {
            "--from-file"
        };

        self.tool.run(&args([
            "create",
            "secret",
            "generic",
            name,
            "--namespace",
            namespace,
            from,
            source,
        ]))
    }

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<()> {
        self.tool
            .run(&args(["delete", "secret", name, "--namespace", namespace]))
    }

    fn create_cluster_role_binding(&self, name: &str, role: &str, user: &str) -> Result<()> {
        self.tool.run(&args([
            "create",
            "clusterrolebinding",
            name,
            "--clusterrole",
            role,
            "--user",
            user,
        ]))
    }
}

/// In-memory cluster for tests.
///
/// Namespaces carry their labels; every mutating call is also recorded as
/// a short action string such as `"delete namespace feature-x"`.
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    namespaces: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
    failing: Arc<Mutex<Vec<String>>>,
    actions: Arc<Mutex<Vec<String>>>,
}

impl MockCluster {
    /// Create a new empty mock cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace with the given labels.
    pub fn add_namespace(&self, name: &str, labels: &[&str]) {
        self.namespaces.lock().unwrap().insert(
            name.to_string(),
            labels.iter().map(|l| (*l).to_string()).collect(),
        );
    }

    /// Make any action starting with `prefix` fail.
    pub fn fail_on(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.to_string());
    }

    /// Recorded actions, in order.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.lock().unwrap().contains_key(name)
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

impl ClusterBackend for MockCluster {
    fn namespaces(&self, labels: &[&str]) -> Result<Vec<String>> {
        let namespaces = self.namespaces.lock().unwrap();
        Ok(namespaces
            .iter()
            .filter(|(_, own)| labels.iter().all(|label| own.iter().any(|l| l == label)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn create_namespace(&self, name: &str, label: Option<&str>) -> Result<()> {
        self.record(format!("create namespace {name}"))?;
        let labels: Vec<String> = label.into_iter().map(String::from).collect();
        self.namespaces.lock().unwrap().insert(name.to_string(), labels);
        Ok(())
    }

    fn delete_namespace(&self, name: &str) -> Result<()> {
        self.record(format!("delete namespace {name}"))?;
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    fn apply(&self, manifests: &Path, recursive: bool) -> Result<()> {
        let flag = if recursive { " --recursive" } else { "" };
        self.record(format!("apply{flag} {}", manifests.display()))
    }

    fn create_secret_from_file(
        &self,
        name: &str,
        source: &str,
        namespace: &str,
        env_file: bool,
    ) -> Result<()> {
        let kind = if env_file { "env-file" } else { "file" };
        self.record(format!("create secret {name} in {namespace} from {kind} {source}"))
    }

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<()> {
        self.record(format!("delete secret {name} in {namespace}"))
    }

    fn create_cluster_role_binding(&self, name: &str, role: &str, user: &str) -> Result<()> {
        self.record(format!("create clusterrolebinding {name} {role} {user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_label_filter() {
        let cluster = MockCluster::new();
        cluster.add_namespace("default", &[]);
        cluster.add_namespace("feature-x", &["kube-git-syncer=true"]);

        assert_eq!(
            cluster.namespaces(&["kube-git-syncer=true"]).unwrap(),
            vec!["feature-x"]
        );
        assert_eq!(cluster.namespaces(&[]).unwrap(), vec!["default", "feature-x"]);
    }

    #[test]
    fn test_mock_create_and_delete() {
        let cluster = MockCluster::new();

        cluster
            .create_namespace("feature-x", Some("kube-git-syncer=true"))
            .unwrap();
        assert!(cluster.has_namespace("feature-x"));

        cluster.delete_namespace("feature-x").unwrap();
        assert!(!cluster.has_namespace("feature-x"));
        assert_eq!(
            cluster.actions(),
            vec!["create namespace feature-x", "delete namespace feature-x"]
        );
    }

    #[test]
    fn test_mock_failure() {
        let cluster = MockCluster::new();
        cluster.add_namespace("feature-x", &[]);
        cluster.fail_on("delete namespace");

        assert!(cluster.delete_namespace("feature-x").is_err());
        assert!(cluster.has_namespace("feature-x"));
    }
}
