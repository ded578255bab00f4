use anyhow::{Context as _, Result};
use kubekit::sanitize;

use crate::Context;
use crate::cli::{NotifyCommand, SlackCommand};
use crate::notify::{self, Message, SUCCESS_COLOR, SUCCESS_TITLE};
use crate::project::Project;
use crate::ui;

pub fn run(ctx: &Context, project: &Project, cmd: NotifyCommand) -> Result<()> {
    match cmd {
        NotifyCommand::Slack(SlackCommand::Success {
            webhook,
            namespace,
            commit,
        }) => {
            let message = success_message(project, &namespace, &commit)?;
            notify::send(&webhook, &message).context("Slack notification failed")?;
            if !ctx.quiet {
                ui::success("Slack notified");
            }
            Ok(())
        }
    }
}

/// The deployment-succeeded message for `namespace` at `commit`.
pub fn success_message(project: &Project, namespace: &str, commit: &str) -> Result<Message> {
    let namespace = sanitize(namespace);
    let production = project.config().is_production(&namespace);
    let fields = notify::deployment_fields(project.domain()?, &namespace, commit, production);
    Ok(notify::message(SUCCESS_TITLE, fields, SUCCESS_COLOR))
}
