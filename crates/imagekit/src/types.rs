//! Core types for image planning.

use serde::Serialize;

/// Tag every production build is published under.
pub const PRODUCTION_TAG: &str = "master";

/// Tag for local builds and the current production image.
pub const LATEST_TAG: &str = "latest";

/// Where a project's images live.
///
/// Repositories are named `<host>/<project id>/<project name>-<image>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    host: String,
    project_id: String,
    project_name: String,
}

impl Registry {
    pub fn new(
        host: impl Into<String>,
        project_id: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            project_id: project_id.into(),
            project_name: project_name.into(),
        }
    }

    /// Google Container Registry for a project.
    pub fn gcr(project_id: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self::new("gcr.io", project_id, project_name)
    }

    /// Untagged repository for an image.
    pub fn repository(&self, image: &str) -> String {
        format!("{}/{}/{}-{}", self.host, self.project_id, self.project_name, image)
    }

    /// Repository with `:tag` appended, or untagged when `tag` is empty.
    pub fn reference(&self, image: &str, tag: &str) -> String {
        let repository = self.repository(image);
        if tag.is_empty() {
            repository
        } else {
            format!("{repository}:{tag}")
        }
    }

    /// Every reference an image may be tagged with.
    ///
    /// Branch and commit references are omitted when the identifier is
    /// empty.
    pub fn tag_set(
        &self,
        image: &str,
        branch: &str,
        commit: &str,
        fixed_tag: Option<&str>,
    ) -> TaggedImageSet {
        let tagged = |tag: &str| (!tag.is_empty()).then(|| self.reference(image, tag));

        TaggedImageSet {
            base: self.repository(image),
            latest: self.reference(image, LATEST_TAG),
            production: self.reference(image, PRODUCTION_TAG),
            branch: tagged(branch),
            commit: tagged(commit),
            fixed: fixed_tag.and_then(tagged),
        }
    }
}

/// The images of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    /// Final image name
    pub base_image: String,
    /// Intermediate Dockerfile stages, in build order. Each name must match
    /// a `FROM ... AS <name>` stage.
    pub stages: Vec<String>,
    /// Tag that replaces branch/commit tagging
    pub fixed_tag: Option<String>,
}

impl ImageSpec {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    #[must_use]
    pub fn with_fixed_tag(mut self, fixed_tag: Option<String>) -> Self {
        self.fixed_tag = fixed_tag.filter(|t| !t.is_empty());
        self
    }

    /// Stage images followed by the final image.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.base_image.as_str()))
    }
}

/// References computed for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedImageSet {
    pub base: String,
    pub latest: String,
    pub production: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub fixed: Option<String>,
}

impl TaggedImageSet {
    /// Every tagged reference, in a stable order.
    pub fn all(&self) -> Vec<String> {
        let mut tags = vec![self.latest.clone(), self.production.clone()];
        tags.extend(
            [&self.branch, &self.commit, &self.fixed]
                .into_iter()
                .flatten()
                .cloned(),
        );
        tags
    }

    /// Reference this image's own builds are cached under.
    pub fn cache_candidate(&self) -> Option<&String> {
        self.fixed.as_ref().or(self.branch.as_ref())
    }
}

/// Who is building, and for which branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// Sanitized branch name; empty outside CI
    pub branch: String,
    /// Short commit hash; empty outside CI
    pub commit: String,
    /// Namespace whose branch publishes `latest`
    pub production_namespace: Option<String>,
}

impl BuildContext {
    /// A developer machine: no branch, no commit.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn ci(
        branch: impl Into<String>,
        commit: impl Into<String>,
        production_namespace: Option<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
            production_namespace,
        }
    }

    pub fn is_local(&self) -> bool {
        self.branch.is_empty() && self.commit.is_empty()
    }

    /// Whether this build publishes the production image.
    pub fn is_production(&self) -> bool {
        !self.branch.is_empty() && self.production_namespace.as_deref() == Some(self.branch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_references() {
        let registry = Registry::gcr("demo-123", "demo");

        assert_eq!(registry.repository("frontend"), "gcr.io/demo-123/demo-frontend");
        assert_eq!(
            registry.reference("frontend", "abc"),
            "gcr.io/demo-123/demo-frontend:abc"
        );
        assert_eq!(registry.reference("frontend", ""), "gcr.io/demo-123/demo-frontend");
    }

    #[test]
    fn test_tag_set() {
        let registry = Registry::gcr("p", "demo");
        let set = registry.tag_set("api", "feature-x", "abcd123", None);

        assert_eq!(set.base, "gcr.io/p/demo-api");
        assert_eq!(set.latest, "gcr.io/p/demo-api:latest");
        assert_eq!(set.production, "gcr.io/p/demo-api:master");
        assert_eq!(set.branch.as_deref(), Some("gcr.io/p/demo-api:feature-x"));
        assert_eq!(set.commit.as_deref(), Some("gcr.io/p/demo-api:abcd123"));
        assert_eq!(set.fixed, None);
        assert_eq!(set.all().len(), 4);
        assert_eq!(set.cache_candidate(), set.branch.as_ref());
    }

    #[test]
    fn test_tag_set_fixed_and_empty() {
        let registry = Registry::gcr("p", "demo");
        let set = registry.tag_set("db", "", "abcd123", Some("v2"));

        assert_eq!(set.branch, None);
        assert_eq!(set.fixed.as_deref(), Some("gcr.io/p/demo-db:v2"));
        assert_eq!(set.cache_candidate(), set.fixed.as_ref());
        assert_eq!(
            set.all(),
            vec![
                "gcr.io/p/demo-db:latest",
                "gcr.io/p/demo-db:master",
                "gcr.io/p/demo-db:abcd123",
                "gcr.io/p/demo-db:v2",
            ]
        );
    }

    #[test]
    fn test_image_order() {
        let spec = ImageSpec::new("web").with_stages(vec!["deps".into(), "build-env".into()]);
        assert_eq!(spec.images().collect::<Vec<_>>(), vec!["deps", "build-env", "web"]);
    }

    #[test]
    fn test_empty_fixed_tag_dropped() {
        let spec = ImageSpec::new("web").with_fixed_tag(Some(String::new()));
        assert_eq!(spec.fixed_tag, None);
    }

    #[test]
    fn test_context() {
        assert!(BuildContext::local().is_local());
        assert!(!BuildContext::ci("a", "", None).is_local());
        assert!(BuildContext::ci("master", "abc", Some("master".into())).is_production());
        assert!(!BuildContext::ci("feature", "abc", Some("master".into())).is_production());
        assert!(!BuildContext::ci("", "abc", Some(String::new())).is_production());
    }
}
