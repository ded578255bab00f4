use anyhow::{Context as _, Result, bail};
use kubekit::Kubectl;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::{InfraCommand, VarLayout};
use crate::commands::cluster;
use crate::deps;
use crate::gcloud::{BucketStatus, REQUIRED_APIS, roles};
use crate::project::{MANIFESTS_DIR, Project};
use crate::ui;

/// Ingress controller service whose load balancer gets the reserved IP.
const INGRESS_SERVICE_MANIFEST: &str = "static/nginx-ingress-controller/2-cloud-generic.yaml";

pub fn run(ctx: &Context, project: &Project, cmd: InfraCommand) -> Result<()> {
    match cmd {
        InfraCommand::Setup(vars) => setup(project, vars.var_layout),
        InfraCommand::Cleanup => cleanup(project),
        InfraCommand::Authenticate(vars) => authenticate(project, vars.var_layout),
        InfraCommand::Unauthenticate => unauthenticate(project),
        InfraCommand::Deploy(vars) => deploy(ctx, project, vars.var_layout),
        InfraCommand::Destroy(vars) => destroy(ctx, project, vars.var_layout),
        InfraCommand::Terraform {
            subcommand,
            args,
            with_vars,
            vars,
        } => {
            deps::require(&[deps::TERRAFORM])?;
            project
                .terraform(vars.var_layout)?
                .run_command(&subcommand, &args, with_vars)?;
            Ok(())
        }
    }
}

// ============================================================================
// Project bootstrap
// ============================================================================

fn setup(project: &Project, layout: VarLayout) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::GSUTIL, deps::TERRAFORM])?;
    let gcloud = project.gcloud()?;
    let config = project.config();
    let account = config.service_account();

    ui::section("Enabling APIs");
    gcloud.enable_apis(REQUIRED_APIS)?;

    ui::section("Creating service account");
    let title = config.title.as_deref().unwrap_or(project.project_name()?);
    gcloud.create_service_account(&account, title)?;
    for role in [
        roles::EDITOR,
        roles::SOURCE_ADMIN,
        roles::LOGS_CONFIG_WRITER,
        roles::PROJECT_IAM_ADMIN,
    ] {
        gcloud.add_role_to_service_account(&account, role)?;
    }
    gcloud.create_key(&account, Path::new("."))?;

    ui::section("Granting Cloud Build access");
    let cloud_build = gcloud.cloud_build_service_account()?;
    for role in [
        roles::CONTAINER_ADMIN,
        roles::SERVICE_ACCOUNT_KEY_ADMIN,
        roles::CRYPTO_KEY_DECRYPTER,
    ] {
        gcloud.add_role("serviceAccount", &cloud_build, role)?;
    }

    ui::section("Preparing Terraform state bucket");
    let bucket = config.terraform_bucket();
    match gcloud.bucket_status(&bucket)? {
        BucketStatus::OtherProject => bail!(
            "Bucket '{bucket}' belongs to another project. Set '{}' to a different name.",
            configstore::keys::TERRAFORM_BUCKET
        ),
        BucketStatus::Available => gcloud.create_bucket(&bucket)?,
        BucketStatus::InProject => log::info!("Bucket {bucket} already exists"),
    }

    project.terraform(layout)?.init()?;
    ui::success("Project setup complete");
    Ok(())
}

fn cleanup(project: &Project) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::GSUTIL])?;
    let gcloud = project.gcloud()?;
    let account = project.config().service_account();

    gcloud.remove_role_from_service_account(&account, roles::EDITOR)?;
    gcloud.delete_service_account(&account)?;
    gcloud.delete_bucket(&project.config().terraform_bucket())?;

    ui::success("Project cleanup complete");
    Ok(())
}

fn authenticate(project: &Project, layout: VarLayout) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::TERRAFORM])?;
    let account = project.config().service_account();
    let key = project.gcloud()?.create_key(&account, project.dir())?;
    log::info!("Wrote service account key {}", key.display());
    project.terraform(layout)?.init()?;
    Ok(())
}

fn unauthenticate(project: &Project) -> Result<()> {
    deps::require(&[deps::GCLOUD])?;
    let account = project.config().service_account();
    project.gcloud()?.delete_key(&account, project.dir())?;
    ui::success("Service account key deleted");
    Ok(())
}

// ============================================================================
// Deploy and destroy
// ============================================================================

/// Pin the ingress load balancer to `ip` in a Service manifest.
pub fn set_load_balancer_ip(manifest: &str, ip: &str) -> Result<String> {
    let mut document: Value =
        serde_yaml::from_str(manifest).context("Ingress manifest is not valid YAML")?;

    let Some(spec) = document.get_mut("spec").and_then(Value::as_mapping_mut) else {
        bail!("Ingress manifest has no 'spec' mapping");
    };
    spec.insert(Value::from("loadBalancerIP"), Value::from(ip));

    let rendered = serde_yaml::to_string(&document).context("Failed to render ingress manifest")?;
    Ok(format!("---\n{rendered}"))
}

fn update_ingress_ip(project: &Project, ip: &str) -> Result<()> {
    let path = project.path(MANIFESTS_DIR).join(INGRESS_SERVICE_MANIFEST);
    let manifest =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    fs::write(&path, set_load_balancer_ip(&manifest, ip)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Set ingress IP {ip} in {}", path.display());
    Ok(())
}

fn deploy(ctx: &Context, project: &Project, layout: VarLayout) -> Result<()> {
    deps::require(&[deps::GCLOUD, deps::KUBECTL, deps::TERRAFORM])?;
    let terraform = project.terraform(layout)?;

    ui::section("Deploying infrastructure");
    terraform.apply()?;
    update_ingress_ip(project, &terraform.ingress_ip()?)?;

    ui::header("Name servers");
    for server in terraform.name_servers()? {
        println!("  {server}");
    }
    println!();
    ui::info(&format!(
        "Point the name servers of {} at the servers above.",
        project.domain()?
    ));

    if !ui::confirm("Have you changed the name servers?", ctx.yes)? {
        ui::warn("Change the name servers, then run 'kubails infra deploy' again.");
        return Ok(());
    }

    ui::section("Deploying cluster");
    cluster::authenticate(project)?;
    let email = project.gcloud()?.current_user_email()?;
    cluster::deploy_cluster(&Kubectl::new()?, project, &email)?;

    ui::success("Infrastructure deployed");
    Ok(())
}

fn destroy(ctx: &Context, project: &Project, layout: VarLayout) -> Result<()> {
    let name = project.project_name()?;
    let first = format!("This will destroy the infrastructure of project '{name}'. Are you sure?");
    let second = "Everything except the KMS keys will be gone. Really destroy?";
    if !ui::confirm(&first, ctx.yes)? || !ui::confirm(second, ctx.yes)? {
        ui::warn("Aborted");
        return Ok(());
    }

    deps::require(&[deps::KUBECTL, deps::TERRAFORM])?;
    let terraform = project.terraform(layout)?;
    cluster::destroy_ingress(&Kubectl::new()?, &terraform)?;
    if terraform.destroy()? {
        ui::success("Infrastructure destroyed");
    }
    Ok(())
}
