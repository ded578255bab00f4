//! Google Cloud access through the `gcloud` and `gsutil` CLIs.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::runner;

pub const BINARY: &str = "gcloud";
pub const GSUTIL: &str = "gsutil";

/// APIs a project needs before anything else can be created.
pub const REQUIRED_APIS: &[&str] = &[
    "cloudkms.googleapis.com",
    "cloudbuild.googleapis.com",
    "cloudfunctions.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "compute.googleapis.com",
    "container.googleapis.com",
    "containerregistry.googleapis.com",
    "dns.googleapis.com",
    "iam.googleapis.com",
    "replicapool.googleapis.com",
    "replicapoolupdater.googleapis.com",
    "resourceviews.googleapis.com",
    "secretmanager.googleapis.com",
    "sourcerepo.googleapis.com",
];

pub mod roles {
    pub const EDITOR: &str = "roles/editor";
    pub const SOURCE_ADMIN: &str = "roles/source.admin";
    pub const LOGS_CONFIG_WRITER: &str = "roles/logging.configWriter";
    pub const PROJECT_IAM_ADMIN: &str = "roles/resourcemanager.projectIamAdmin";
    pub const CONTAINER_ADMIN: &str = "roles/container.admin";
    pub const SERVICE_ACCOUNT_KEY_ADMIN: &str = "roles/iam.serviceAccountKeyAdmin";
    pub const CRYPTO_KEY_DECRYPTER: &str = "roles/cloudkms.cryptoKeyDecrypter";
    pub const CLUSTER_ADMIN: &str = "cluster-admin";
}

/// Direction of a KMS operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kms {
    Encrypt,
    Decrypt,
}

/// Where a bucket name stands relative to this project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    InProject,
    OtherProject,
    Available,
}

/// Commands scoped to one Google Cloud project.
#[derive(Debug, Clone)]
pub struct Gcloud {
    project_id: String,
    region: String,
    zone: String,
}

impl Gcloud {
    pub fn new(
        project_id: impl Into<String>,
        region: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            region: region.into(),
            zone: zone.into(),
        }
    }

    /// `--project <id>` followed by `args`.
    pub fn args(&self, args: &[&str]) -> Vec<String> {
        let mut command = vec!["--project".to_string(), self.project_id.clone()];
        command.extend(args.iter().map(|arg| (*arg).to_string()));
        command
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        exec(&self.args(args))
    }

    fn capture(&self, args: &[&str]) -> Result<String> {
        let command = self.args(args);
        let refs: Vec<&str> = command.iter().map(String::as_str).collect();
        runner::run_capture(BINARY, &refs)
    }

    // =========================================================================
    // Project
    // =========================================================================

    /// Enable every API, stopping at the first failure.
    pub fn enable_apis(&self, apis: &[&str]) -> Result<()> {
        for api in apis {
            log::info!("Enabling {api}...");
            self.run(&["services", "enable", api])
                .with_context(|| format!("Failed to enable {api}"))?;
        }
        Ok(())
    }

    pub fn current_user_email(&self) -> Result<String> {
        self.capture(&["config", "get-value", "account"])
    }

    pub fn project_number(&self) -> Result<String> {
        self.capture(&[
            "projects",
            "describe",
            &self.project_id,
            "--format=value(projectNumber)",
        ])
    }

    /// Service account Cloud Build runs as.
    pub fn cloud_build_service_account(&self) -> Result<String> {
        Ok(format!(
            "{}@cloudbuild.gserviceaccount.com",
            self.project_number()?
        ))
    }

    // =========================================================================
    // IAM
    // =========================================================================

    /// `<account>@<project>.iam.gserviceaccount.com`
    pub fn full_service_account(&self, account: &str) -> String {
        format!("{account}@{}.iam.gserviceaccount.com", self.project_id)
    }

    pub fn create_service_account(&self, account: &str, project_title: &str) -> Result<()> {
        log::info!("Creating service account {account}...");
        let display_name = format!("{project_title} service account");
        self.run(&[
            "iam",
            "service-accounts",
            "create",
            account,
            "--display-name",
            &display_name,
        ])
    }

    pub fn delete_service_account(&self, account: &str) -> Result<()> {
        log::info!("Deleting service account {account}...");
        let full = self.full_service_account(account);
        self.run(&["iam", "service-accounts", "delete", "-q", &full])
    }

    /// Arguments for adding or removing a project IAM binding.
    pub fn binding_args(&self, add: bool, member: &str, role: &str) -> Vec<String> {
        let id = self.project_id.as_str();
        let mut args = if add {
            vec!["projects", "add-iam-policy-binding", id]
        } else {
            vec!["projects", "remove-iam-policy-binding", id, "-q"]
        };
        args.extend(["--member", member, "--role", role]);
        self.args(&args)
    }

    /// Bind `role` to `<entity_type>:<entity>`.
    pub fn add_role(&self, entity_type: &str, entity: &str, role: &str) -> Result<()> {
        log::info!("Binding {entity} to role {role}...");
        exec(&self.binding_args(true, &format!("{entity_type}:{entity}"), role))
    }

    pub fn remove_role(&self, entity_type: &str, entity: &str, role: &str) -> Result<()> {
        log::info!("Removing role binding {role} from {entity}...");
        exec(&self.binding_args(false, &format!("{entity_type}:{entity}"), role))
    }

    pub fn add_role_to_service_account(&self, account: &str, role: &str) -> Result<()> {
        self.add_role("serviceAccount", &self.full_service_account(account), role)
    }

    pub fn remove_role_from_service_account(&self, account: &str, role: &str) -> Result<()> {
        self.remove_role("serviceAccount", &self.full_service_account(account), role)
    }

    // =========================================================================
    // Service account keys
    // =========================================================================

    /// Create `<dir>/<account>.json` unless it already exists.
    ///
    /// gcloud writes the file even when creation fails, so a failed run
    /// removes it again.
    pub fn create_key(&self, account: &str, dir: &Path) -> Result<PathBuf> {
        let key_file = key_file(account, dir);
        if key_file.is_file() {
            log::info!("Key for service account {account} already exists.");
            return Ok(key_file);
        }

        log::info!("Creating key for service account {account}...");
        let full = self.full_service_account(account);
        let path = key_file.display().to_string();
        let result = self.run(&[
            "iam",
            "service-accounts",
            "keys",
            "create",
            &path,
            "--iam-account",
            &full,
        ]);

        if let Err(e) = result {
            if key_file.exists() {
                fs::remove_file(&key_file)
                    .with_context(|| format!("Failed to remove {}", key_file.display()))?;
            }
            return Err(e);
        }
        Ok(key_file)
    }

    /// Delete the local key file and revoke the key it holds.
    pub fn delete_key(&self, account: &str, dir: &Path) -> Result<()> {
        let key_file = key_file(account, dir);
        if !key_file.is_file() {
            log::info!("Key for service account {account} doesn't exist.");
            return Ok(());
        }

        let key_id = read_private_key_id(&key_file)?;
        fs::remove_file(&key_file)
            .with_context(|| format!("Failed to remove {}", key_file.display()))?;

        let full = self.full_service_account(account);
        self.run(&[
            "iam",
            "service-accounts",
            "keys",
            "delete",
            &key_id,
            "--iam-account",
            &full,
            "--quiet",
        ])
    }

    // =========================================================================
    // Cluster and KMS
    // =========================================================================

    /// Point kubectl at the project cluster.
    pub fn authenticate_cluster(&self, cluster: &str) -> Result<()> {
        self.run(&[
            "container",
            "clusters",
            "get-credentials",
            "--zone",
            &self.zone,
            cluster,
        ])
    }

    /// Arguments for a KMS encrypt or decrypt between two files.
    pub fn kms_args(
        &self,
        direction: Kms,
        ciphertext: &Path,
        plaintext: &Path,
        keyring: &str,
        key: &str,
    ) -> Vec<String> {
        let verb = match direction {
            Kms::Encrypt => "encrypt",
            Kms::Decrypt => "decrypt",
        };
        let ciphertext = ciphertext.display().to_string();
        let plaintext = plaintext.display().to_string();
        self.args(&[
            "kms",
            verb,
            "--ciphertext-file",
            &ciphertext,
            "--plaintext-file",
            &plaintext,
            "--location",
            &self.region,
            "--keyring",
            keyring,
            "--key",
            key,
        ])
    }

    pub fn kms(
        &self,
        direction: Kms,
        ciphertext: &Path,
        plaintext: &Path,
        keyring: &str,
        key: &str,
    ) -> Result<()> {
        exec(&self.kms_args(direction, ciphertext, plaintext, keyring, key))
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    pub fn bucket_status(&self, bucket: &str) -> Result<BucketStatus> {
        let url = format!("gs://{bucket}");
        let listing = runner::run_combined(GSUTIL, &["ls", &url])?;
        if listing.contains("AccessDeniedException") {
            return Ok(BucketStatus::OtherProject);
        }

        let buckets = runner::run_capture(GSUTIL, &["ls"])?;
        if parse_bucket_list(&buckets).iter().any(|name| name == bucket) {
            Ok(BucketStatus::InProject)
        } else {
            Ok(BucketStatus::Available)
        }
    }

    pub fn create_bucket(&self, bucket: &str) -> Result<()> {
        log::info!("Creating bucket {bucket}...");
        runner::run_checked(GSUTIL, &["mb", &format!("gs://{bucket}")])
    }

    pub fn delete_bucket(&self, bucket: &str) -> Result<()> {
        log::info!("Deleting bucket {bucket}...");
        runner::run_checked(GSUTIL, &["rm", "-r", &format!("gs://{bucket}")])
    }
}

fn exec(args: &[String]) -> Result<()> {
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    runner::run_checked(BINARY, &refs)
}

/// `<dir>/<account>.json`
pub fn key_file(account: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{account}.json"))
}

#[derive(Deserialize)]
struct KeyFile {
    private_key_id: Option<String>,
}

/// The `private_key_id` of a service account key file.
pub fn read_private_key_id(path: &Path) -> Result<String> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let key: KeyFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid key file {}", path.display()))?;

    match key.private_key_id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => bail!(
            "Invalid key file {}. Missing 'private_key_id' field.",
            path.display()
        ),
    }
}

/// Bucket names from `gsutil ls` output.
pub fn parse_bucket_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_start_matches("gs://").replace('/', ""))
        .filter(|name| !name.is_empty())
        .collect()
}
