//! The loaded project, handed explicitly to every command.

use anyhow::{Context, Result, bail};
use configstore::{ConfigStore, Project as ProjectConfig, flatten, flatten_grouped};
use imagekit::Registry;
use kubekit::{Syncer, sanitize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tfkit::Terraform;

use crate::cli::{SelectionArgs, VarLayout};
use crate::gcloud::Gcloud;

pub const SERVICES_DIR: &str = "services";
pub const HELM_DIR: &str = "helm";
pub const MANIFESTS_DIR: &str = "manifests";

/// A project document plus the typed view of its reserved keys.
pub struct Project {
    store: ConfigStore,
    config: ProjectConfig,
    /// Services the default selection is narrowed to, when change detection ran
    changed: Option<BTreeSet<String>>,
}

impl Project {
    /// Open `path`, or search upwards from the current directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let store = match path {
            Some(path) => ConfigStore::open(path)?,
            None => {
                let cwd = std::env::current_dir().context("Cannot determine current directory")?;
                ConfigStore::discover(&cwd)?
            }
        };
        log::debug!("Using project document {:?}", store.path());
        Self::from_store(store)
    }

    pub fn from_store(store: ConfigStore) -> Result<Self> {
        let config = ProjectConfig::from_config(store.read())?;
        Ok(Self {
            store,
            config,
            changed: None,
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Set a value by path, persist, and refresh the typed view.
    ///
    /// The change is validated against a scratch copy first, so a value that
    /// would make the document unloadable is never written.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut candidate = ConfigStore::in_memory(self.store.read().clone());
        candidate.set(key, value.clone())?;
        let config = ProjectConfig::from_config(candidate.read())
            .with_context(|| format!("Refusing to set '{key}'"))?;

        self.store.set(key, value)?;
        self.config = config;
        Ok(())
    }

    /// Directory holding the project document.
    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.store.project_path(sub)
    }

    // =========================================================================
    // Required settings
    // =========================================================================

    pub fn project_id(&self) -> Result<&str> {
        required(self.config.gcp_project_id.as_deref(), configstore::keys::GCP_PROJECT_ID)
    }

    pub fn project_name(&self) -> Result<&str> {
        required(self.config.name.as_deref(), configstore::keys::PROJECT_NAME)
    }

    pub fn domain(&self) -> Result<&str> {
        required(self.config.domain.as_deref(), configstore::keys::DOMAIN)
    }

    pub fn gcloud(&self) -> Result<Gcloud> {
        Ok(Gcloud::new(
            self.project_id()?,
            required(
                self.config.gcp_project_region.as_deref(),
                configstore::keys::GCP_PROJECT_REGION,
            )?,
            required(
                self.config.gcp_project_zone.as_deref(),
                configstore::keys::GCP_PROJECT_ZONE,
            )?,
        ))
    }

    pub fn registry(&self) -> Result<Registry> {
        Ok(Registry::gcr(self.project_id()?, self.project_name()?))
    }

    // =========================================================================
    // Terraform
    // =========================================================================

    /// `TF_VAR_*` environment for the whole document.
    pub fn terraform_variables(&self, layout: VarLayout) -> BTreeMap<String, String> {
        match layout {
            VarLayout::Flat => tfkit::vars::encode_all(&flatten(self.store.read())),
            VarLayout::Grouped => tfkit::vars::encode_all(&flatten_grouped(self.store.read())),
        }
    }

    pub fn terraform(&self, layout: VarLayout) -> Result<Terraform> {
        Ok(Terraform::new(self.dir(), self.terraform_variables(layout))?)
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Source directory of a service.
    pub fn service_dir(&self, service: &str) -> Result<PathBuf> {
        let spec = self
            .config
            .service(service)
            .with_context(|| format!("Unknown service '{service}'"))?;
        Ok(self.path(SERVICES_DIR).join(spec.folder_name(service)))
    }

    /// Every configured service.
    pub fn all_services(&self, requested: &[String]) -> Result<Vec<String>> {
        let all: Vec<&str> = self.config.services.keys().map(String::as_str).collect();
        self.select(requested, &all)
    }

    /// Services with source code.
    pub fn code_services(&self, requested: &[String]) -> Result<Vec<String>> {
        self.select(requested, &self.config.services_with_code())
    }

    /// Services that declare secrets.
    pub fn secret_services(&self, requested: &[String]) -> Result<Vec<String>> {
        self.select(requested, &self.config.services_with_secrets())
    }

    /// `requested` when given (each must exist), otherwise `defaults`
    /// narrowed to the changed services.
    fn select(&self, requested: &[String], defaults: &[&str]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            for service in requested {
                if self.config.service(service).is_none() {
                    bail!("Unknown service '{service}'");
                }
            }
            return Ok(requested.to_vec());
        }

        Ok(defaults
            .iter()
            .filter(|service| {
                self.changed
                    .as_ref()
                    .is_none_or(|changed| changed.contains(**service))
            })
            .map(|service| (*service).to_string())
            .collect())
    }

    /// Narrow the default service selection according to the global flags.
    pub fn apply_selection(&mut self, selection: &SelectionArgs, syncer: &Syncer) -> Result<()> {
        self.changed = self.changed_services(selection, syncer)?;
        if let Some(changed) = &self.changed {
            log::info!("Using changed services: {changed:?}");
        }
        Ok(())
    }

    /// Services whose folder changed, or `None` when every service applies.
    pub fn changed_services(
        &self,
        selection: &SelectionArgs,
        syncer: &Syncer,
    ) -> Result<Option<BTreeSet<String>>> {
        if !selection.only_changed_services {
            return Ok(None);
        }

        let branch = selection.all_services_branch.as_deref();
        if let Some(branch) = branch {
            let namespace = sanitize(branch);

            if self.config.is_production(&namespace) {
                log::info!("Using all services: '{namespace}' is production");
                return Ok(None);
            }

            if syncer.is_new_namespace(&namespace)? {
                log::info!("Using all services: '{namespace}' is a new branch");
                return Ok(None);
            }
        }

        // Diffed relative to the repository root, where sources live under services/
        let paths: Vec<(&str, String)> = self
            .config
            .services_with_code()
            .into_iter()
            .filter_map(|service| {
                self.config.service(service).map(|spec| {
                    (service, format!("{SERVICES_DIR}/{}", spec.folder_name(service)))
                })
            })
            .collect();
        let pathspecs: Vec<&str> = paths.iter().map(|(_, path)| path.as_str()).collect();

        let changed_paths: BTreeSet<&str> = syncer
            .changed_folders(&pathspecs, branch, &selection.since)?
            .into_iter()
            .collect();

        Ok(Some(
            paths
                .iter()
                .filter(|(_, path)| changed_paths.contains(path.as_str()))
                .map(|(service, _)| (*service).to_string())
                .collect(),
        ))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.with_context(|| format!("'{key}' is not set in the project configuration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use configstore::Config;
    use kubekit::{MANAGED_LABEL, MockCluster, MockVcs};
    use serde_json::json;

    fn project(value: Value) -> Project {
        let Value::Object(root) = value else {
            panic!("expected object");
        };
        Project::from_store(ConfigStore::in_memory(root)).unwrap()
    }

    fn sample() -> Project {
        project(json!({
            "__gcp_project_id": "demo-123",
            "__gcp_project_region": "us-east1",
            "__gcp_project_zone": "us-east1-b",
            "__project_name": "demo",
            "__production_namespace": "master",
            "__services": {
                "api": {"folder": "backend"},
                "web": {},
                "proxy": {"folder": ""},
                "worker": {"secrets": {"name": "worker-secrets", "file": "secrets.env.encrypted"}}
            }
        }))
    }

    fn selection(branch: Option<&str>) -> SelectionArgs {
        SelectionArgs {
            only_changed_services: true,
            since: "master".to_string(),
            all_services_branch: branch.map(String::from),
        }
    }

    fn syncer(cluster: &MockCluster, vcs: &MockVcs) -> Syncer {
        Syncer::with_backends(Box::new(cluster.clone()), Box::new(vcs.clone()))
    }

    #[test]
    fn test_default_selections() {
        let project = sample();

        assert_eq!(
            project.all_services(&[]).unwrap(),
            vec!["api", "proxy", "web", "worker"]
        );
        assert_eq!(project.code_services(&[]).unwrap(), vec!["api", "web", "worker"]);
        assert_eq!(project.secret_services(&[]).unwrap(), vec!["worker"]);
    }

    #[test]
    fn test_explicit_selection_is_validated() {
        let project = sample();

        assert_eq!(
            project.code_services(&["proxy".into()]).unwrap(),
            vec!["proxy"]
        );
        assert!(project.code_services(&["nope".into()]).is_err());
    }

    #[test]
    fn test_service_dir_uses_folder() {
        let project = sample();

        assert!(project.service_dir("api").unwrap().ends_with("services/backend"));
        assert!(project.service_dir("web").unwrap().ends_with("services/web"));
        assert!(project.service_dir("nope").is_err());
    }

    #[test]
    fn test_required_settings() {
        let project = project(json!({"__project_name": "demo"}));

        let err = project.registry().unwrap_err().to_string();
        assert!(err.contains("__gcp_project_id"));
        assert_eq!(project.project_name().unwrap(), "demo");
    }

    #[test]
    fn test_terraform_variable_layouts() {
        let project = project(json!({"__services": {"web": {"replicas": 2}}, "tags": ["a"]}));

        let flat = project.terraform_variables(VarLayout::Flat);
        assert_eq!(flat["TF_VAR___services__web__replicas"], "2");
        assert_eq!(flat["TF_VAR_tags"], "[\"a\"]");

        let grouped = project.terraform_variables(VarLayout::Grouped);
        assert_eq!(grouped["TF_VAR___services"], "{web__replicas=\"2\"}");
    }

    #[test]
    fn test_set_refreshes_view() {
        let mut project = project(Value::Object(Config::new()));

        project.set("__services.web.folder", "frontend").unwrap();

        assert_eq!(project.config().services.len(), 1);
        assert!(project.service_dir("web").unwrap().ends_with("services/frontend"));
    }

    #[test]
    fn test_changed_services_ignores_folders_outside_services() {
        let project = sample();
        let vcs = MockVcs::new(&[]);
        vcs.change("web");
        vcs.change("backend");

        let changed = project
            .changed_services(&selection(None), &syncer(&MockCluster::new(), &vcs))
            .unwrap()
            .unwrap();

        assert!(changed.is_empty());
        assert!(vcs.actions().contains(&"diff HEAD master -- services/web".to_string()));
    }

    #[test]
    fn test_set_rejects_invalid_service_without_persisting() {
        let mut project = sample();

        let err = project
            .set("__services.web.image_stages", "build-env")
            .unwrap_err();

        assert!(format!("{err:#}").contains("__services.web.image_stages"));
        assert_eq!(project.store().get("__services.web.image_stages"), None);
        assert!(project.config().service("web").unwrap().image_stages.is_empty());

        project.set("__services.web.folder", "frontend").unwrap();
        assert!(project.service_dir("web").unwrap().ends_with("services/frontend"));
    }

    #[test]
    fn test_changed_services_disabled() {
        let project = sample();
        let selection = SelectionArgs::default();
        let syncer = syncer(&MockCluster::new(), &MockVcs::new(&[]));

        assert_eq!(project.changed_services(&selection, &syncer).unwrap(), None);
    }

    #[test]
    fn test_changed_services_by_folder() {
        let mut project = sample();
        let cluster = MockCluster::new();
        cluster.add_namespace("feature-x", &[MANAGED_LABEL]);
        let vcs = MockVcs::new(&[]);
        vcs.change("services/backend");

        project
            .apply_selection(&selection(Some("feature/x")), &syncer(&cluster, &vcs))
            .unwrap();

        assert_eq!(project.code_services(&[]).unwrap(), vec!["api"]);
        assert_eq!(project.all_services(&[]).unwrap(), vec!["api"]);
        assert!(vcs.actions().contains(&"checkout feature/x".to_string()));
        assert!(
            vcs.actions()
                .contains(&"diff feature/x master -- services/backend".to_string())
        );
    }

    #[test]
    fn test_production_branch_uses_all_services() {
        let project = sample();
        let vcs = MockVcs::new(&[]);

        let changed = project
            .changed_services(&selection(Some("master")), &syncer(&MockCluster::new(), &vcs))
            .unwrap();

        assert_eq!(changed, None);
        assert!(vcs.actions().is_empty());
    }

    #[test]
    fn test_new_branch_uses_all_services() {
        let project = sample();

        let changed = project
            .changed_services(
                &selection(Some("feature/new")),
                &syncer(&MockCluster::new(), &MockVcs::new(&[])),
            )
            .unwrap();

        assert_eq!(changed, None);
    }

    #[test]
    fn test_changed_services_without_branch() {
        let project = sample();
        let vcs = MockVcs::new(&[]);
        vcs.change("services/web");

        let changed = project
            .changed_services(&selection(None), &syncer(&MockCluster::new(), &vcs))
            .unwrap()
            .unwrap();

        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["web"]);
    }
}
