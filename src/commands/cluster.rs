use anyhow::{Context as _, Result, bail};
use kubekit::{ClusterBackend, Helm, Kubectl, MANAGED_LABEL, Syncer, TemplateRequest, sanitize};
use regex::Regex;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tfkit::Terraform;
use walkdir::WalkDir;

use crate::Context;
use crate::cli::{ClusterCommand, ManifestsCommand, SecretsCommand, VarLayout};
use crate::deps;
use crate::gcloud::{Kms, roles};
use crate::project::{HELM_DIR, MANIFESTS_DIR, Project};
use crate::ui;

/// Namespace the ingress controller is installed into.
pub const INGRESS_NAMESPACE: &str = "ingress-nginx";

/// Values file every service render starts from, under the chart's `values/`.
const SERVICE_VALUES: &str = "values.yaml";

/// Plaintext secrets land here while they are being deployed.
const DECRYPTED_SECRETS: &str = "decrypted_secrets";

static ENV_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_.\-]*)\s*=").expect("env key regex")
});

pub fn run(ctx: &Context, project: &mut Project, cmd: ClusterCommand) -> Result<()> {
    match cmd {
        ClusterCommand::Authenticate => authenticate(project),
        ClusterCommand::Destroy => destroy(ctx, project),
        ClusterCommand::CleanupNamespaces => cleanup_namespaces(project),
        ClusterCommand::IsNewNamespace { namespace } => is_new_namespace(project, &namespace),
        ClusterCommand::Manifests(ManifestsCommand::Generate {
            services,
            namespace,
            tag,
        }) => generate_manifests(ctx, project, &services, &namespace, &tag),
        ClusterCommand::Manifests(ManifestsCommand::Deploy {
            services,
            namespace,
        }) => {
            deps::require(&[deps::KUBECTL])?;
            deploy_manifests(&Kubectl::new()?, project, &services, &namespace)
        }
        ClusterCommand::Secrets(SecretsCommand::Deploy {
            services,
            namespace,
        }) => deploy_secrets(project, &services, &namespace),
        ClusterCommand::Secrets(SecretsCommand::Create {
            file,
            service,
            secret_name,
        }) => create_secret(project, &file, service, secret_name),
    }
}

// ============================================================================
// Cluster lifecycle
// ============================================================================

/// Fetch kubectl credentials for the cluster Terraform created.
pub fn authenticate(project: &Project) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::TERRAFORM])?;
    let terraform = project.terraform(VarLayout::Flat)?;
    let cluster = terraform
        .cluster_name()
        .context("Cannot find the cluster name; has the infrastructure been deployed?")?;
    project.gcloud()?.authenticate_cluster(&cluster)
}

fn destroy(ctx: &Context, project: &Project) -> Result<()> {
    let prompt = format!(
        "This will delete the cluster for project '{}'. Are you sure?",
        project.project_name()?
    );
    if !ui::confirm(&prompt, ctx.yes)? {
        ui::warn("Aborted");
        return Ok(());
    }

    deps::require(&[deps::KUBECTL, deps::TERRAFORM])?;
    let terraform = project.terraform(VarLayout::Flat)?;
    destroy_ingress(&Kubectl::new()?, &terraform)?;
    terraform.destroy_cluster()?;
    Ok(())
}

/// Delete the ingress namespace so its load balancer is released.
///
/// Skipped when no cluster is in the Terraform state.
pub fn destroy_ingress(cluster: &dyn ClusterBackend, terraform: &Terraform) -> Result<()> {
    if !terraform.cluster_deployed()? {
        log::info!("No cluster deployed, skipping ingress teardown");
        return Ok(());
    }

    log::info!("Deleting namespace {INGRESS_NAMESPACE}...");
    cluster.delete_namespace(INGRESS_NAMESPACE)?;
    Ok(())
}

/// Install the cluster-wide add-ons shipped under `manifests/static`.
pub fn deploy_cluster(cluster: &dyn ClusterBackend, project: &Project, email: &str) -> Result<()> {
    let manifests = project.path(MANIFESTS_DIR).join("static");

    ui::info("Deploying storage classes...");
    cluster.apply(&manifests.join("storage-classes"), true)?;

    ui::info("Granting cluster-admin to the current user...");
    cluster.create_cluster_role_binding(
        &format!("{email}-cluster-admin-binding"),
        roles::CLUSTER_ADMIN,
        email,
    )?;

    ui::info("Deploying ingress controller...");
    cluster.apply(&manifests.join("nginx-ingress-controller"), true)?;

    ui::info("Deploying cert-manager...");
    cluster.apply(&manifests.join("cert-manager"), true)?;
    let account = project.config().service_account();
    cluster.create_secret_from_file(
        "clouddns-service-account",
        &format!("service-account.json=./{account}.json"),
        "cert-manager",
        false,
    )?;

    ui::info("Deploying certificate reflector...");
    cluster.apply(&manifests.join("certificate-reflector"), false)?;
    Ok(())
}

// ============================================================================
// Namespaces
// ============================================================================

fn cleanup_namespaces(project: &Project) -> Result<()> {
    deps::require(&[deps::GIT, deps::KUBECTL])?;
    let syncer = Syncer::new(project.dir())?;
    let deleted = syncer.cleanup_namespaces(|namespace| println!("{namespace}"))?;
    log::info!("Deleted {} namespace(s)", deleted.len());
    Ok(())
}

fn is_new_namespace(project: &Project, namespace: &str) -> Result<()> {
    deps::require(&[deps::GIT, deps::KUBECTL])?;
    let syncer = Syncer::new(project.dir())?;
    if !syncer.is_new_namespace(namespace)? {
        bail!("Namespace '{}' already exists", sanitize(namespace));
    }
    Ok(())
}

// ============================================================================
// Manifests
// ============================================================================

/// Subdomain prefix for a namespace; production serves the bare domain.
pub fn subdomain(namespace: &str, production: bool) -> String {
    if production {
        String::new()
    } else {
        format!("{namespace}.")
    }
}

/// The `helm template` call rendering one service.
pub fn template_request(
    project: &Project,
    service: &str,
    namespace: &str,
    tag: &str,
) -> Result<TemplateRequest> {
    let spec = project
        .config()
        .service(service)
        .with_context(|| format!("Unknown service '{service}'"))?;
    let production = project.config().is_production(namespace);
    let tag = if tag.is_empty() { "latest" } else { tag };

    Ok(TemplateRequest {
        output_dir: generated_dir(project).join(service),
        value_files: vec![SERVICE_VALUES.to_string()],
        templates: spec.templates.iter().map(|t| format!("{t}.yaml")).collect(),
        string_vars: vec![
            format!("image={}", spec.image_name(service)),
            format!("tag={tag}"),
            format!("namespace={namespace}"),
            format!("subdomain={}", subdomain(namespace, production)),
            format!("replicas={}", spec.replicas_for(production)),
            format!("serviceName={service}"),
        ],
    })
}

fn generated_dir(project: &Project) -> PathBuf {
    project.path(MANIFESTS_DIR).join("generated")
}

/// Remove every `*.yaml` below `dir`, returning how many were deleted.
pub fn clear_generated(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "yaml") {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn generate_manifests(
    ctx: &Context,
    project: &Project,
    services: &[String],
    namespace: &str,
    tag: &str,
) -> Result<()> {
    deps::require(&[deps::HELM])?;
    let namespace = sanitize(namespace);
    let services = project.all_services(services)?;

    let generated = generated_dir(project);
    let removed = clear_generated(&generated)?;
    log::debug!("Removed {removed} previously generated manifest(s)");

    let base_values = project
        .store()
        .path()
        .context("Project document has no backing file")?;
    let helm = Helm::new(project.path(HELM_DIR), base_values)?;

    for (i, service) in services.iter().enumerate() {
        if !ctx.quiet {
            ui::step(i + 1, services.len(), &format!("Generating manifests for {service}"));
        }
        let request = template_request(project, service, &namespace, tag)?;
        fs::create_dir_all(&request.output_dir)
            .with_context(|| format!("Failed to create {}", request.output_dir.display()))?;
        helm.template(&request)
            .with_context(|| format!("Failed to render manifests for {service}"))?;
    }
    Ok(())
}

/// Apply each service's generated manifests into `namespace`.
///
/// A namespace that does not exist yet is created with the managed label.
pub fn deploy_manifests(
    cluster: &dyn ClusterBackend,
    project: &Project,
    services: &[String],
    namespace: &str,
) -> Result<()> {
    let namespace = sanitize(namespace);
    let services = project.all_services(services)?;

    if !namespace.is_empty() {
        let live = cluster.namespaces(&[])?;
        if kubekit::is_new_namespace(&namespace, &live) {
            ui::info(&format!("Creating namespace {namespace}..."));
            cluster.create_namespace(&namespace, Some(MANAGED_LABEL))?;
        }
    }

    let generated = generated_dir(project);
    for service in &services {
        ui::info(&format!("Deploying {service}..."));
        cluster
            .apply(&generated.join(service), true)
            .with_context(|| format!("Failed to deploy {service}"))?;
    }
    Ok(())
}

// ============================================================================
// Secrets
// ============================================================================

/// Keys declared by an env file, in order.
///
/// Blank lines and `#` comments are skipped, as is anything that is not a
/// `KEY=value` assignment.
pub fn parse_env_keys(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| ENV_KEY.captures(line))
        .map(|captures| captures[1].to_string())
        .collect()
}

/// `<file name>.encrypted`, next to `file`.
pub fn encrypted_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".encrypted");
    file.with_file_name(name)
}

fn kms_names(project: &Project) -> Result<(String, String)> {
    let terraform = project.terraform(VarLayout::Flat)?;
    let keyring = terraform
        .kms_key_ring_name()
        .context("Cannot find the KMS key ring; has the infrastructure been deployed?")?;
    let key = terraform.kms_key_name()?;
    Ok((keyring, key))
}

fn deploy_secrets(project: &Project, services: &[String], namespace: &str) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::KUBECTL, deps::TERRAFORM])?;
    let namespace = sanitize(namespace);
    let services = project.secret_services(services)?;
    if services.is_empty() {
        ui::dim("No services with secrets");
        return Ok(());
    }

    let gcloud = project.gcloud()?;
    let cluster = Kubectl::new()?;
    let (keyring, key) = kms_names(project)?;
    let decrypted = project.path(DECRYPTED_SECRETS);

    for service in &services {
        let spec = project
            .config()
            .service(service)
            .and_then(|spec| spec.secrets.as_ref())
            .with_context(|| format!("Service '{service}' has no secrets"))?;
        let (Some(name), Some(file)) = (spec.name.as_deref(), spec.file.as_deref()) else {
            bail!("Secrets of '{service}' need both a name and a file");
        };

        ui::info(&format!("Deploying secret {name} for {service}..."));
        let encrypted = project.service_dir(service)?.join(file);
        gcloud.kms(Kms::Decrypt, &encrypted, &decrypted, &keyring, &key)?;

        let result = replace_secret(&cluster, name, &decrypted, &namespace);
        if let Err(e) = fs::remove_file(&decrypted) {
            log::warn!("Failed to remove {}: {e}", decrypted.display());
        }
        result.with_context(|| format!("Failed to deploy secrets for {service}"))?;
    }
    Ok(())
}

/// Drop any existing secret `name` and recreate it from an env file.
pub fn replace_secret(
    cluster: &dyn ClusterBackend,
    name: &str,
    env_file: &Path,
    namespace: &str,
) -> Result<()> {
    if let Err(e) = cluster.delete_secret(name, namespace) {
        log::debug!("No previous secret {name} in {namespace}: {e}");
    }
    cluster.create_secret_from_file(name, &env_file.display().to_string(), namespace, true)?;
    Ok(())
}

fn create_secret(
    project: &mut Project,
    file: &Path,
    service: Option<String>,
    secret_name: Option<String>,
) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::TERRAFORM])?;
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let keys = parse_env_keys(&content);
    if keys.is_empty() {
        bail!(
            "{} is either empty or an invalid env file. Not encrypting.",
            file.display()
        );
    }

    let folder = current_folder()?;
    let service = service.unwrap_or_else(|| folder.clone());
    if project.config().service(&service).is_none() {
        bail!("Unknown service '{service}'");
    }
    let secret_name = secret_name.unwrap_or_else(|| format!("{folder}-secrets"));

    let (keyring, key) = kms_names(project)?;
    let encrypted = encrypted_path(file);
    project
        .gcloud()?
        .kms(Kms::Encrypt, &encrypted, file, &keyring, &key)?;

    let encrypted_name = encrypted
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    project.set(
        &format!("{}.{service}.secrets", configstore::keys::SERVICES),
        json!({
            "name": secret_name,
            "file": encrypted_name,
            "variables": keys,
        }),
    )?;

    ui::success(&format!("Encrypted {} to {}", file.display(), encrypted.display()));
    Ok(())
}

fn current_folder() -> Result<String> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(cwd
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default())
}
