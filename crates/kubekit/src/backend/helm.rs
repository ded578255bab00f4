//! Manifest rendering through `helm template`.

use super::{Tool, args};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Executable this backend drives.
pub const BINARY: &str = "helm";

/// Value files live here, relative to the chart.
pub const VALUES_FOLDER: &str = "values";

/// Template files live here, relative to the chart.
pub const TEMPLATES_FOLDER: &str = "templates";

/// One `helm template` invocation.
#[derive(Debug, Clone, Default)]
pub struct TemplateRequest {
    pub output_dir: PathBuf,
    /// Files under the chart's `values/` folder, applied after the base values.
    pub value_files: Vec<String>,
    /// Templates to render, by file name under `templates/`. Empty renders all.
    pub templates: Vec<String>,
    /// `key=value` pairs passed through `--set-string`.
    pub string_vars: Vec<String>,
}

/// A chart plus the base values file every render starts from.
pub struct Helm {
    tool: Tool,
    chart: PathBuf,
    base_values: PathBuf,
}

impl Helm {
    /// Locate `helm` in PATH.
    pub fn new(chart: impl Into<PathBuf>, base_values: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            tool: Tool::locate(BINARY)?,
            chart: chart.into(),
            base_values: base_values.into(),
        })
    }

    pub fn template(&self, request: &TemplateRequest) -> Result<()> {
        self.tool
            .run(&template_args(&self.chart, &self.base_values, request))
    }
}

/// Arguments for `helm template`.
pub fn template_args(chart: &Path, base_values: &Path, request: &TemplateRequest) -> Vec<String> {
    let mut command = args(["template", "--output-dir"]);
    command.push(request.output_dir.display().to_string());
    command.push("--values".to_string());
    command.push(base_values.display().to_string());

    for file in &request.value_files {
        command.push("--values".to_string());
        command.push(chart.join(VALUES_FOLDER).join(file).display().to_string());
    }

    for template in &request.templates {
        command.push("-x".to_string());
        command.push(format!("{TEMPLATES_FOLDER}/{template}"));
    }

    for var in &request.string_vars {
        command.push("--set-string".to_string());
        command.push(var.clone());
    }

    command.push(chart.display().to_string());
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_args() {
        let request = TemplateRequest {
            output_dir: PathBuf::from("manifests/generated/web"),
            value_files: vec!["values.yaml".into()],
            templates: vec!["deployment.yaml".into(), "service.yaml".into()],
            string_vars: vec!["tag=abc".into(), "subdomain=".into()],
        };

        assert_eq!(
            template_args(Path::new("helm"), Path::new("kubails.json"), &request),
            vec![
                "template",
                "--output-dir",
                "manifests/generated/web",
                "--values",
                "kubails.json",
                "--values",
                "helm/values/values.yaml",
                "-x",
                "templates/deployment.yaml",
                "-x",
                "templates/service.yaml",
                "--set-string",
                "tag=abc",
                "--set-string",
                "subdomain=",
                "helm",
            ]
        );
    }

    #[test]
    fn test_template_args_renders_everything_by_default() {
        let request = TemplateRequest {
            output_dir: PathBuf::from("out"),
            ..TemplateRequest::default()
        };

        let command = template_args(Path::new("helm"), Path::new("kubails.json"), &request);
        assert!(!command.contains(&"-x".to_string()));
        assert_eq!(command.last().map(String::as_str), Some("helm"));
    }
}
