use anyhow::Result;
use colored::Colorize;
use configstore::keys;

use crate::Context;
use crate::cli::VarLayout;
use crate::deps::{self, Tool};
use crate::project::Project;
use crate::runner;
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
}

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Kubails Health Check");

    let mut issues: Vec<Issue> = Vec::new();

    check_commands(&mut issues);
    check_project(ctx, &mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All systems healthy!");
    } else {
        print_issue_summary(&issues);
    }

    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        let num = i + 1;
        println!(
            "  {}  {} {}",
            format!("{num}.").bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        println!();
    }
}

fn missing_tool(tool: Tool) -> Issue {
    Issue {
        category: "Required Commands",
        summary: format!("{} is not installed", tool.name),
        detail: Some(format!("Needed for: {}", tool.purpose)),
        fix: Some(tool.install_hint.to_string()),
    }
}

fn check_commands(issues: &mut Vec<Issue>) {
    ui::section("Required Commands");

    for tool in deps::REQUIRED_BINARIES {
        if runner::command_exists(tool.name) {
            println!("  {} {} - {}", "✓".green(), tool.name, tool.purpose.dimmed());
        } else {
            println!(
                "  {} {} - {} {}",
                "✗".red(),
                tool.name,
                tool.purpose,
                "(missing)".red()
            );
            issues.push(missing_tool(*tool));
        }
    }
}

fn check_project(ctx: &Context, issues: &mut Vec<Issue>) {
    ui::section("Project");

    let project = match Project::load(ctx.config.as_deref()) {
        Ok(project) => project,
        Err(e) => {
            println!("  {} no project document", "-".dimmed());
            log::debug!("No project: {e:#}");
            return;
        }
    };

    if let Some(path) = project.store().path() {
        ui::kv("Document", &path.display().to_string());
    }

    let config = project.config();
    for (key, set) in [
        (keys::GCP_PROJECT_ID, config.gcp_project_id.is_some()),
        (keys::GCP_PROJECT_REGION, config.gcp_project_region.is_some()),
        (keys::GCP_PROJECT_ZONE, config.gcp_project_zone.is_some()),
        (keys::PROJECT_NAME, config.name.is_some()),
        (keys::DOMAIN, config.domain.is_some()),
    ] {
        if set {
            println!("  {} {key}", "✓".green());
        } else {
            println!("  {} {key} {}", "✗".red(), "(unset)".red());
            issues.push(Issue {
                category: "Project",
                summary: format!("'{key}' is not set"),
                detail: None,
                fix: Some(format!("kubails config set {key} <value>")),
            });
        }
    }

    let variables = project.terraform_variables(VarLayout::Flat);
    println!(
        "  {} {} Terraform variable(s), {} service(s)",
        "✓".green(),
        variables.len(),
        config.services.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_issue() {
        let issue = missing_tool(deps::HELM);

        assert_eq!(issue.summary, "helm is not installed");
        assert_eq!(issue.detail.as_deref(), Some("Needed for: Manifest templating"));
        assert_eq!(issue.fix.as_deref(), Some(deps::HELM.install_hint));
    }
}
