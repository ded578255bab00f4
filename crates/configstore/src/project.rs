//! Typed view over the reserved keys of a project document.
//!
//! The document stays the source of truth; [`Project`] is a read-only
//! snapshot taken with [`Project::from_config`] for code that needs the
//! well-known settings with their defaults applied.

use crate::error::{Error, Result};
use crate::store::Config;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved top-level keys.
pub mod keys {
    pub const GCP_PROJECT_ID: &str = "__gcp_project_id";
    pub const GCP_PROJECT_REGION: &str = "__gcp_project_region";
    pub const GCP_PROJECT_ZONE: &str = "__gcp_project_zone";
    pub const PROJECT_TITLE: &str = "__project_title";
    pub const PROJECT_NAME: &str = "__project_name";
    pub const SERVICES: &str = "__services";
    pub const DOMAIN: &str = "__domain";
    pub const PRODUCTION_NAMESPACE: &str = "__production_namespace";
    pub const TERRAFORM_BUCKET: &str = "__terraform_bucket";
}

/// Secrets attached to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsSpec {
    /// Name of the Kubernetes secret
    #[serde(default)]
    pub name: Option<String>,
    /// Encrypted env file, relative to the service folder
    #[serde(default)]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SecretsSpec {
    /// True when nothing at all is configured.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.file.is_none() && self.extra.is_empty()
    }
}

/// One entry of `__services`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Image name; the service name is used when empty
    #[serde(default)]
    pub image: Option<String>,
    /// Intermediate build stages, in order
    #[serde(default)]
    pub image_stages: Vec<String>,
    /// Tag that replaces branch/commit tagging
    #[serde(default)]
    pub fixed_tag: Option<String>,
    /// Source folder under `services/`; an empty string means config-only
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub secrets: Option<SecretsSpec>,
    /// Helm templates rendered for this service
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub replicas: Option<Value>,
    #[serde(default)]
    pub production_replicas: Option<Value>,
    /// Remaining keys, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceSpec {
    /// Base image name, defaulting to the service name.
    pub fn image_name<'a>(&'a self, service: &'a str) -> &'a str {
        non_empty(self.image.as_deref()).unwrap_or(service)
    }

    /// Source folder, defaulting to the service name.
    pub fn folder_name<'a>(&'a self, service: &'a str) -> &'a str {
        self.folder.as_deref().unwrap_or(service)
    }

    /// Whether the service has source code to build.
    ///
    /// Only an explicitly empty `folder` marks a service as config-only.
    pub fn has_code(&self) -> bool {
        self.folder.as_deref() != Some("")
    }

    /// Whether the service declares any secrets.
    pub fn has_secrets(&self) -> bool {
        self.secrets.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn fixed_tag(&self) -> Option<&str> {
        non_empty(self.fixed_tag.as_deref())
    }

    /// Replica count for the given environment, rendered for templating.
    pub fn replicas_for(&self, production: bool) -> String {
        let value = if production {
            self.production_replicas.as_ref().or(self.replicas.as_ref())
        } else {
            self.replicas.as_ref()
        };

        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "1".to_string(),
        }
    }
}

/// Snapshot of the reserved project settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub gcp_project_id: Option<String>,
    pub gcp_project_region: Option<String>,
    pub gcp_project_zone: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub production_namespace: Option<String>,
    terraform_bucket: Option<String>,
    pub services: BTreeMap<String, ServiceSpec>,
}

impl Project {
    /// Read the reserved keys from a document.
    ///
    /// Missing keys stay `None`. A `__services` value that is not an
    /// object, or a service entry that does not fit [`ServiceSpec`], is an
    /// error.
    pub fn from_config(config: &Config) -> Result<Self> {
        let string = |key: &str| non_empty(config.get(key).and_then(Value::as_str)).map(String::from);

        let services = match config.get(keys::SERVICES) {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, spec)| {
                    serde_json::from_value::<ServiceSpec>(spec.clone())
                        .map(|spec| (name.clone(), spec))
                        .map_err(|source| Error::InvalidService {
                            name: name.clone(),
                            source,
                        })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(Error::InvalidSection {
                    key: keys::SERVICES.to_string(),
                    expected: "an object",
                });
            }
        };

        Ok(Self {
            gcp_project_id: string(keys::GCP_PROJECT_ID),
            gcp_project_region: string(keys::GCP_PROJECT_REGION),
            gcp_project_zone: string(keys::GCP_PROJECT_ZONE),
            title: string(keys::PROJECT_TITLE),
            name: string(keys::PROJECT_NAME),
            domain: string(keys::DOMAIN),
            production_namespace: string(keys::PRODUCTION_NAMESPACE),
            terraform_bucket: string(keys::TERRAFORM_BUCKET),
            services,
        })
    }

    /// Project name, or an empty string when unset.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// State bucket, defaulting to `<project>-terraform`.
    pub fn terraform_bucket(&self) -> String {
        self.terraform_bucket
            .clone()
            .unwrap_or_else(|| format!("{}-terraform", self.name()))
    }

    /// Name of the deployment service account.
    pub fn service_account(&self) -> String {
        format!("{}-account", self.name())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    /// Services with source code, sorted by name.
    pub fn services_with_code(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, spec)| spec.has_code())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Services that declare secrets, sorted by name.
    pub fn services_with_secrets(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, spec)| spec.has_secrets())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether `namespace` is the production namespace.
    pub fn is_production(&self, namespace: &str) -> bool {
        self.production_namespace.as_deref() == Some(namespace)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
