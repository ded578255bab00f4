use anyhow::{Context as _, Result};
use imagekit::{BuildContext, BuildPlan, Builder, ImageSpec, plan};
use kubekit::sanitize;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::{ImagesArgs, ImagesCommand, MakeArgs, ServiceCommand};
use crate::deps;
use crate::project::{Project, SERVICES_DIR};
use crate::runner;
use crate::ui;

const COMPOSE_FILE: &str = "docker-compose.yaml";

pub fn run(ctx: &Context, project: &Project, cmd: ServiceCommand) -> Result<()> {
    match cmd {
        ServiceCommand::Start { services } => start(project, &services),
        ServiceCommand::Destroy => destroy(project),
        ServiceCommand::Lint(args) => make(ctx, project, "lint", &args),
        ServiceCommand::Test(args) => make(ctx, project, "test", &args),
        ServiceCommand::Ci(args) => make(ctx, project, "ci", &args),
        ServiceCommand::Make { target, args } => make(ctx, project, &target, &args),
        ServiceCommand::Images(ImagesCommand::Build(args)) => build(ctx, project, &args),
        ServiceCommand::Images(ImagesCommand::Push(args)) => push(ctx, project, &args),
    }
}

// ============================================================================
// docker-compose
// ============================================================================

/// `docker-compose -p <project> --file <compose file> <args>`
pub fn compose_args(project_name: &str, compose_file: &Path, args: &[&str]) -> Vec<String> {
    let mut command = vec![
        "-p".to_string(),
        project_name.to_string(),
        "--file".to_string(),
        compose_file.display().to_string(),
    ];
    command.extend(args.iter().map(|arg| (*arg).to_string()));
    command
}

fn compose(project: &Project, args: &[&str]) -> Result<()> {
    deps::require(&[deps::DOCKER_COMPOSE])?;
    let compose_file = project.path(SERVICES_DIR).join(COMPOSE_FILE);
    let command = compose_args(project.project_name()?, &compose_file, args);
    let refs: Vec<&str> = command.iter().map(String::as_str).collect();
    runner::run_checked(deps::DOCKER_COMPOSE.name, &refs)
}

fn start(project: &Project, services: &[String]) -> Result<()> {
    ui::info("Starting services locally...");
    let mut args = vec!["up", "--build"];
    args.extend(services.iter().map(String::as_str));
    compose(project, &args)
}

fn destroy(project: &Project) -> Result<()> {
    ui::info("Destroying service containers, networks, and volumes...");
    compose(project, &["down", "-v"])
}

// ============================================================================
// make
// ============================================================================

/// `make -C <dir> <target> CACHE=<option>`
///
/// `cache` is the image reference to reuse layers from; without one the
/// variable is passed empty so Makefiles can splice it unconditionally.
pub fn make_args(service_dir: &Path, target: &str, cache: Option<&str>) -> Vec<String> {
    let cache = cache.map_or(String::new(), |image| format!("--cache-from={image}"));
    vec![
        "-C".to_string(),
        service_dir.display().to_string(),
        target.to_string(),
        format!("CACHE={cache}"),
    ]
}

fn make(ctx: &Context, project: &Project, target: &str, args: &MakeArgs) -> Result<()> {
    deps::require(&[deps::MAKE])?;
    let services = project.code_services(&args.services)?;
    let tag = args.tag.as_deref().map(sanitize).filter(|tag| !tag.is_empty());
    let registry = tag.as_ref().map(|_| project.registry()).transpose()?;

    for (i, service) in services.iter().enumerate() {
        if !ctx.quiet {
            ui::step(i + 1, services.len(), &format!("make {target} in {service}"));
        }

        let cache = match (&registry, &tag) {
            (Some(registry), Some(tag)) => {
                let spec = project
                    .config()
                    .service(service)
                    .with_context(|| format!("Unknown service '{service}'"))?;
                Some(registry.reference(spec.image_name(service), tag))
            }
            _ => None,
        };

        let command = make_args(&project.service_dir(service)?, target, cache.as_deref());
        let refs: Vec<&str> = command.iter().map(String::as_str).collect();
        runner::run_checked(deps::MAKE.name, &refs)
            .with_context(|| format!("make {target} failed for {service}"))?;
    }

    Ok(())
}

// ============================================================================
// Images
// ============================================================================

/// Build context for `--branch`/`--commit`; both empty means a local build.
pub fn build_context(project: &Project, branch: &str, commit: &str) -> BuildContext {
    let branch = sanitize(branch);
    if branch.is_empty() && commit.is_empty() {
        BuildContext::local()
    } else {
        BuildContext::ci(branch, commit, project.config().production_namespace.clone())
    }
}

/// Build plan for one service.
pub fn service_plan(project: &Project, service: &str, ctx: &BuildContext) -> Result<BuildPlan> {
    let spec = project
        .config()
        .service(service)
        .with_context(|| format!("Unknown service '{service}'"))?;

    let image = ImageSpec::new(spec.image_name(service))
        .with_stages(spec.image_stages.clone())
        .with_fixed_tag(spec.fixed_tag().map(String::from));

    Ok(plan(&image, &project.registry()?, ctx))
}

fn plans(project: &Project, args: &ImagesArgs) -> Result<Vec<(String, PathBuf, BuildPlan)>> {
    let ctx = build_context(project, &args.branch, &args.commit);
    project
        .code_services(&args.services)?
        .into_iter()
        .map(|service| {
            let dir = project.service_dir(&service)?;
            let plan = service_plan(project, &service, &ctx)?;
            Ok((service, dir, plan))
        })
        .collect()
}

fn build(ctx: &Context, project: &Project, args: &ImagesArgs) -> Result<()> {
    deps::require(&[deps::DOCKER])?;
    let builder = Builder::new()?;

    for (service, dir, plan) in plans(project, args)? {
        if !ctx.quiet {
            ui::section(&format!("Building {service}"));
        }
        builder
            .build(&dir, &plan)
            .with_context(|| format!("Failed to build {service}"))?;
    }
    Ok(())
}

fn push(ctx: &Context, project: &Project, args: &ImagesArgs) -> Result<()> {
    deps::require(&[deps::DOCKER])?;
    let builder = Builder::new()?;

    for (service, _, plan) in plans(project, args)? {
        if !ctx.quiet {
            ui::section(&format!("Pushing {service}"));
        }
        builder
            .push(&plan)
            .with_context(|| format!("Failed to push {service}"))?;
    }
    Ok(())
}
