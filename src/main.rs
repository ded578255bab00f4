mod cli;
mod commands;
mod deps;
mod gcloud;
mod notify;
mod project;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, SelectionArgs};
use kubekit::Syncer;
use project::Project;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Explicit project document, if one was given
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        quiet: cli.quiet,
        yes: cli.yes,
        config: cli.config,
    };

    match cli.command {
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "kubails", &mut io::stdout());
            Ok(())
        }
        Command::Doctor => commands::doctor::run(&ctx),
        Command::Config(cmd) => {
            commands::config::run(&ctx, &mut load_project(&ctx, &cli.selection)?, cmd)
        }
        Command::Infra(cmd) => {
            commands::infra::run(&ctx, &load_project(&ctx, &cli.selection)?, cmd)
        }
        Command::Cluster(cmd) => {
            commands::cluster::run(&ctx, &mut load_project(&ctx, &cli.selection)?, cmd)
        }
        Command::Service(cmd) => {
            commands::service::run(&ctx, &load_project(&ctx, &cli.selection)?, cmd)
        }
        Command::Notify(cmd) => {
            commands::notify::run(&ctx, &load_project(&ctx, &cli.selection)?, cmd)
        }
    }
}

/// Load the project document and apply the global service selection.
fn load_project(ctx: &Context, selection: &SelectionArgs) -> Result<Project> {
    let mut project = Project::load(ctx.config.as_deref())?;
    if selection.only_changed_services {
        let syncer = Syncer::new(project.dir())?;
        project.apply_selection(selection, &syncer)?;
    }
    Ok(project)
}
