use anyhow::{Context as _, Result, bail};
use configstore::{flatten, flatten_grouped};
use serde::Serialize;
use serde_json::Value;

use crate::Context;
use crate::cli::{ConfigCommand, VarLayout};
use crate::project::Project;
use crate::ui;

pub fn run(ctx: &Context, project: &mut Project, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::List {
            flattened,
            var_layout,
        } => list(project, flattened, var_layout),
        ConfigCommand::Get { key } => get(project, &key),
        ConfigCommand::Set { key, value } => set(ctx, project, &key, value),
    }
}

fn list(project: &Project, flattened: bool, layout: VarLayout) -> Result<()> {
    let config = project.store().read();

    if !flattened {
        return print_json(config);
    }

    match layout {
        VarLayout::Flat => print_json(&flatten(config)),
        VarLayout::Grouped => print_json(&flatten_grouped(config)),
    }
}

fn get(project: &Project, key: &str) -> Result<()> {
    match project.store().get(key) {
        Some(value) => print_json(value),
        None => bail!("No value at '{key}'"),
    }
}

fn set(ctx: &Context, project: &mut Project, key: &str, value: String) -> Result<()> {
    project
        .set(key, Value::String(value))
        .with_context(|| format!("Failed to set '{key}'"))?;

    if !ctx.quiet {
        let stored = project.store().get(key).cloned().unwrap_or(Value::Null);
        ui::success(&format!("{key} = {stored}"));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", render(value)?);
    Ok(())
}

/// Pretty JSON with four-space indentation.
pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to render JSON")?;
    String::from_utf8(buf).context("Rendered JSON is not UTF-8")
}
