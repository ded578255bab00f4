//! # tfkit
//!
//! Terraform variable encoding and a small client for the `terraform` CLI.
//!
//! Variables are handed to Terraform as `TF_VAR_<name>` environment
//! variables rather than `-var` flags, because Terraform rejects `-var`
//! for undeclared variables and a project document usually carries more
//! keys than `variables.tf` declares.
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use std::path::Path;
//! use tfkit::{Terraform, vars};
//!
//! let config = json!({"__project_name": "demo", "__services": {"api": {"replicas": 2}}});
//! let serde_json::Value::Object(config) = config else { unreachable!() };
//!
//! let terraform = Terraform::new(Path::new("."), vars::encode_all(&config))?;
//! terraform.init()?;
//! terraform.apply()?;
//! println!("cluster: {}", terraform.cluster_name()?);
//! # Ok::<(), tfkit::Error>(())
//! ```

pub mod backend;
pub mod error;
pub mod vars;

pub use error::{Error, ErrorCategory, Result};
pub use backend::MockBackend;

use backend::cli::CliBackend;
use backend::{Backend, Env};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Directory under the project root holding the Terraform configuration.
pub const TERRAFORM_DIR: &str = "terraform";

/// State addresses kept alive by [`Terraform::destroy`]. KMS keys cannot be
/// recreated under the same name once destroyed.
const PROTECTED_MODULE: &str = "module.kms";

const CLUSTER_RESOURCE: &str = "google_container_cluster.primary";
const CLUSTER_STATE_MARKER: &str = "module.cluster.google_container_cluster";

/// Client for one project's Terraform configuration.
pub struct Terraform {
    backend: Box<dyn Backend>,
    dir: PathBuf,
    variables: Env,
}

impl Terraform {
    /// Create a client using the real `terraform` binary.
    ///
    /// `variables` are encoded environment variables, usually from
    /// [`vars::encode_all`].
    pub fn new(project_dir: &Path, variables: Env) -> Result<Self> {
        Ok(Self::with_backend(
            Box::new(CliBackend::new()?),
            project_dir,
            variables,
        ))
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>, project_dir: &Path, variables: Env) -> Self {
        Self {
            backend,
            dir: project_dir.join(TERRAFORM_DIR),
            variables,
        }
    }

    /// Directory Terraform runs in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn variables(&self) -> &Env {
        &self.variables
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initialize the working directory.
    ///
    /// Runs without variables: the Google provider installer breaks when
    /// started with the project variables in its environment.
    pub fn init(&self) -> Result<()> {
        log::info!("Initializing Terraform...");
        self.run_command("init", &[], false)
    }

    /// Apply the configuration with the project variables.
    pub fn apply(&self) -> Result<()> {
        log::info!("Deploying Terraform infrastructure...");
        self.run_command("apply", &[], true)
    }

    /// Destroy everything in state except the KMS module.
    ///
    /// Returns `false` when nothing but KMS state is left, in which case
    /// Terraform is not invoked.
    pub fn destroy(&self) -> Result<bool> {
        let targets: Vec<String> = self
            .state_list()?
            .into_iter()
            .filter(|address| !address.contains(PROTECTED_MODULE))
            .map(|address| format!("-target={address}"))
            .collect();

        if targets.is_empty() {
            log::info!("Not destroying KMS keys. No other state to destroy.");
            return Ok(false);
        }

        log::info!("Destroying infrastructure...");
        let mut args = targets;
        args.push("-auto-approve".to_string());
        self.run_command("destroy", &args, true)?;
        Ok(true)
    }

    /// Destroy only the Kubernetes cluster.
    pub fn destroy_cluster(&self) -> Result<()> {
        self.run_command(
            "destroy",
            &["-target".to_string(), CLUSTER_RESOURCE.to_string()],
            true,
        )
    }

    /// Run an arbitrary subcommand.
    pub fn run_command(&self, subcommand: &str, args: &[String], with_vars: bool) -> Result<()> {
        let mut full = vec![subcommand.to_string()];
        full.extend_from_slice(args);

        let empty = Env::new();
        let env = if with_vars { &self.variables } else { &empty };
        self.backend.run(&self.dir, &full, env)
    }

    // =========================================================================
    // State and outputs
    // =========================================================================

    /// Addresses of every resource in state.
    pub fn state_list(&self) -> Result<Vec<String>> {
        let stdout = self
            .backend
            .output(&self.dir, &["state".to_string(), "list".to_string()])?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Whether the cluster module has been deployed.
    pub fn cluster_deployed(&self) -> Result<bool> {
        Ok(self
            .state_list()?
            .iter()
            .any(|address| address.contains(CLUSTER_STATE_MARKER)))
    }

    /// Raw JSON text of an output.
    pub fn output(&self, name: &str) -> Result<String> {
        let args = ["output".to_string(), "-json".to_string(), name.to_string()];
        let stdout = match self.backend.output(&self.dir, &args) {
            Ok(stdout) => stdout,
            Err(Error::CommandFailed { stderr, .. }) => {
                log::debug!("terraform output {name} failed: {stderr}");
                String::new()
            }
            Err(e) => return Err(e),
        };

        if stdout.is_empty() || stdout == "null" {
            return Err(Error::OutputMissing(name.to_string()));
        }
        Ok(stdout)
    }

    /// An output decoded as JSON.
    pub fn output_value(&self, name: &str) -> Result<Value> {
        let raw = self.output(name)?;
        serde_json::from_str(&raw).map_err(|source| Error::InvalidOutput {
            name: name.to_string(),
            source,
        })
    }

    /// An output as plain text; strings lose their JSON quotes.
    pub fn output_string(&self, name: &str) -> Result<String> {
        Ok(match self.output_value(name)? {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }

    pub fn cluster_name(&self) -> Result<String> {
        self.output_string("cluster_name")
    }

    pub fn ingress_ip(&self) -> Result<String> {
        self.output_string("ingress_ip")
    }

    /// DNS name servers the domain must be delegated to.
    pub fn name_servers(&self) -> Result<Vec<String>> {
        Ok(match self.output_value("dns_name_servers")? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
                .collect(),
            Value::String(text) => vec![text],
            other => vec![other.to_string()],
        })
    }

    pub fn kms_key_name(&self) -> Result<String> {
        self.output_string("secrets_key_name")
    }

    pub fn kms_key_ring_name(&self) -> Result<String> {
        self.output_string("secrets_key_ring_name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(mock: &MockBackend) -> Terraform {
        let mut vars = Env::new();
        vars.insert("TF_VAR___project_name".into(), "demo".into());
        Terraform::with_backend(Box::new(mock.clone()), Path::new("/project"), vars)
    }

    #[test]
    fn test_runs_in_terraform_dir() {
        let mock = MockBackend::new();
        client(&mock).apply().unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].dir, PathBuf::from("/project/terraform"));
        assert_eq!(calls[0].args, vec!["apply"]);
        assert_eq!(calls[0].env.get("TF_VAR___project_name").map(String::as_str), Some("demo"));
    }

    #[test]
    fn test_init_without_vars() {
        let mock = MockBackend::new();
        client(&mock).init().unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["init"]);
        assert!(calls[0].env.is_empty());
    }

    #[test]
    fn test_destroy_skips_kms() {
        let mock = MockBackend::new();
        mock.set_output(
            "state list",
            "module.cluster.google_container_cluster.primary\nmodule.kms.google_kms_key_ring.ring\ngoogle_dns_managed_zone.zone\n",
        );

        assert!(client(&mock).destroy().unwrap());

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].args,
            vec![
                "destroy",
                "-target=module.cluster.google_container_cluster.primary",
                "-target=google_dns_managed_zone.zone",
                "-auto-approve",
            ]
        );
    }

    #[test]
    fn test_destroy_nothing_left() {
        let mock = MockBackend::new();
        mock.set_output("state list", "module.kms.google_kms_crypto_key.key");

        assert!(!client(&mock).destroy().unwrap());
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn test_destroy_cluster_target() {
        let mock = MockBackend::new();
        client(&mock).destroy_cluster().unwrap();

        assert_eq!(
            mock.calls()[0].args,
            vec!["destroy", "-target", "google_container_cluster.primary"]
        );
    }

    #[test]
    fn test_cluster_deployed() {
        let mock = MockBackend::new();
        let terraform = client(&mock);
        assert!(!terraform.cluster_deployed().unwrap());

        mock.set_output("state list", "module.cluster.google_container_cluster.primary");
        assert!(terraform.cluster_deployed().unwrap());
    }

    #[test]
    fn test_outputs() {
        let mock = MockBackend::new();
        mock.set_output("output -json cluster_name", "\"demo-cluster\"");
        mock.set_output(
            "output -json dns_name_servers",
            r#"["ns-cloud-a1.googledomains.com.","ns-cloud-a2.googledomains.com."]"#,
        );
        let terraform = client(&mock);

        assert_eq!(terraform.cluster_name().unwrap(), "demo-cluster");
        assert_eq!(
            terraform.name_servers().unwrap(),
            vec!["ns-cloud-a1.googledomains.com.", "ns-cloud-a2.googledomains.com."]
        );
    }

    #[test]
    fn test_missing_output() {
        let mock = MockBackend::new();
        let err = client(&mock).ingress_ip().unwrap_err();
        assert!(matches!(err, Error::OutputMissing(ref name) if name == "ingress_ip"));

        mock.fail_on("output");
        let err = client(&mock).kms_key_name().unwrap_err();
        assert!(matches!(err, Error::OutputMissing(_)));
    }

    #[test]
    fn test_passthrough_command() {
        let mock = MockBackend::new();
        client(&mock)
            .run_command("plan", &["-out=plan.tfplan".to_string()], false)
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["plan", "-out=plan.tfplan"]);
        assert!(calls[0].env.is_empty());
    }
}
