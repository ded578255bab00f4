//! External tools kubails drives.

use anyhow::{Result, bail};

use crate::runner;

/// A binary some command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

pub const DOCKER: Tool = Tool {
    name: "docker",
    purpose: "Container image builds",
    install_hint: "https://docs.docker.com/get-docker/",
};

pub const DOCKER_COMPOSE: Tool = Tool {
    name: "docker-compose",
    purpose: "Running services locally",
    install_hint: "https://docs.docker.com/compose/install/",
};

pub const GCLOUD: Tool = Tool {
    name: "gcloud",
    purpose: "Google Cloud projects, IAM and KMS",
    install_hint: "https://cloud.google.com/sdk/docs/install",
};

pub const GSUTIL: Tool = Tool {
    name: "gsutil",
    purpose: "Terraform state bucket",
    install_hint: "gcloud components install gsutil",
};

pub const GIT: Tool = Tool {
    name: "git",
    purpose: "Branches and change detection",
    install_hint: "https://git-scm.com/downloads",
};

pub const HELM: Tool = Tool {
    name: "helm",
    purpose: "Manifest templating",
    install_hint: "https://helm.sh/docs/intro/install/",
};

pub const KUBECTL: Tool = Tool {
    name: "kubectl",
    purpose: "Cluster deployments",
    install_hint: "gcloud components install kubectl",
};

pub const MAKE: Tool = Tool {
    name: "make",
    purpose: "Service lint, test and ci targets",
    install_hint: "Install make from your system package manager",
};

pub const TERRAFORM: Tool = Tool {
    name: "terraform",
    purpose: "Cloud infrastructure",
    install_hint: "https://developer.hashicorp.com/terraform/install",
};

/// Every tool any command may need.
pub const REQUIRED_BINARIES: &[Tool] = &[
    DOCKER,
    DOCKER_COMPOSE,
    GCLOUD,
    GIT,
    GSUTIL,
    HELM,
    KUBECTL,
    MAKE,
    TERRAFORM,
];

/// Tools from `tools` that are not in PATH.
pub fn missing(tools: &[Tool]) -> Vec<Tool> {
    tools
        .iter()
        .copied()
        .filter(|tool| !runner::command_exists(tool.name))
        .collect()
}

/// Fail when any of `tools` is not installed.
pub fn require(tools: &[Tool]) -> Result<()> {
    let missing = missing(tools);
    if missing.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = missing.iter().map(|tool| tool.name).collect();
    bail!(
        "Missing required tools: {}. Run 'kubails doctor' for install instructions.",
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_sorted_and_unique() {
        let names: Vec<&str> = REQUIRED_BINARIES.iter().map(|tool| tool.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_require_reports_missing_tool() {
        let tool = Tool {
            name: "kubails-definitely-not-installed",
            purpose: "nothing",
            install_hint: "none",
        };

        assert_eq!(missing(&[tool]), vec![tool]);
        let err = require(&[tool]).unwrap_err().to_string();
        assert!(err.contains("kubails-definitely-not-installed"));
    }

    #[test]
    fn test_require_nothing() {
        assert!(require(&[]).is_ok());
    }
}
