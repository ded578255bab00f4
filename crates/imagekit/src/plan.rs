//! Build plans for multi-stage images.
//!
//! A service's Dockerfile may declare intermediate stages that are worth
//! caching on their own. Without a separately pushed image per stage, any
//! change to an early layer leaves every later stage without a cache. So
//! in CI each stage is built with `--target <stage>` and tagged and pushed
//! like an image of its own, and every later stage lists it as a cache
//! source.

use crate::types::{BuildContext, ImageSpec, Registry};
use serde::Serialize;

/// One `docker build` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    /// Image (stage) name
    pub image: String,
    /// References to tag the result with
    pub tags: Vec<String>,
    /// Dockerfile stage; `None` builds the whole file
    pub target: Option<String>,
    /// Candidate cache images, pulled best-effort before building
    pub cache_from: Vec<String>,
    /// `--build-arg` values
    pub build_args: Vec<String>,
}

/// Everything needed to build and publish one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    /// Builds, in order
    pub steps: Vec<BuildStep>,
    /// References to push, in order
    pub push: Vec<String>,
}

/// Compute the build plan for a service.
pub fn plan(spec: &ImageSpec, registry: &Registry, ctx: &BuildContext) -> BuildPlan {
    if ctx.is_local() {
        return local_plan(spec, registry);
    }

    let fixed_tag = spec.fixed_tag.as_deref();
    let images: Vec<&str> = spec.images().collect();
    let last = images.len() - 1;

    let mut plan = BuildPlan::default();
    let mut earlier_caches: Vec<String> = Vec::new();

    for (index, image) in images.into_iter().enumerate() {
        let tags = registry.tag_set(image, &ctx.branch, &ctx.commit, fixed_tag);

        let mut cache_from = earlier_caches.clone();
        if let Some(candidate) = tags.cache_candidate() {
            cache_from.push(candidate.clone());
            earlier_caches.push(candidate.clone());
        }
        cache_from.push(tags.production.clone());

        let build_args = if ctx.branch.is_empty() {
            Vec::new()
        } else {
            vec![format!("branch={}", ctx.branch)]
        };

        plan.steps.push(BuildStep {
            image: image.to_string(),
            tags: tags.all(),
            target: (index != last).then(|| image.to_string()),
            cache_from,
            build_args,
        });

        if let Some(fixed) = &tags.fixed {
            plan.push.push(fixed.clone());
        } else {
            plan.push.extend(tags.branch.iter().cloned());
            plan.push.extend(tags.commit.iter().cloned());
            if ctx.is_production() {
                plan.push.push(tags.latest.clone());
            }
        }
    }

    plan
}

/// Local builds produce only the final image, tagged `latest`.
fn local_plan(spec: &ImageSpec, registry: &Registry) -> BuildPlan {
    let latest = registry.tag_set(&spec.base_image, "", "", None).latest;

    BuildPlan {
        steps: vec![BuildStep {
            image: spec.base_image.clone(),
            tags: vec![latest.clone()],
            target: None,
            cache_from: Vec::new(),
            build_args: Vec::new(),
        }],
        push: vec![latest],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::gcr("p", "demo")
    }

    fn spec() -> ImageSpec {
        ImageSpec::new("web").with_stages(vec!["build-env".into()])
    }

    fn ci(branch: &str) -> BuildContext {
        BuildContext::ci(branch, "abcd123", Some("master".into()))
    }

    #[test]
    fn test_feature_branch_plan() {
        let plan = plan(&spec(), &registry(), &ci("feature-x"));

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].image, "build-env");
        assert_eq!(plan.steps[0].target.as_deref(), Some("build-env"));
        assert_eq!(plan.steps[1].image, "web");
        assert_eq!(plan.steps[1].target, None);

        assert_eq!(
            plan.push,
            vec![
                "gcr.io/p/demo-build-env:feature-x",
                "gcr.io/p/demo-build-env:abcd123",
                "gcr.io/p/demo-web:feature-x",
                "gcr.io/p/demo-web:abcd123",
            ]
        );
    }

    #[test]
    fn test_feature_branch_tags_and_args() {
        let plan = plan(&spec(), &registry(), &ci("feature-x"));

        assert_eq!(
            plan.steps[1].tags,
            vec![
                "gcr.io/p/demo-web:latest",
                "gcr.io/p/demo-web:master",
                "gcr.io/p/demo-web:feature-x",
                "gcr.io/p/demo-web:abcd123",
            ]
        );
        assert_eq!(plan.steps[1].build_args, vec!["branch=feature-x"]);
    }

    #[test]
    fn test_cache_chain() {
        let plan = plan(&spec(), &registry(), &ci("feature-x"));

        assert_eq!(
            plan.steps[0].cache_from,
            vec![
                "gcr.io/p/demo-build-env:feature-x",
                "gcr.io/p/demo-build-env:master",
            ]
        );
        assert_eq!(
            plan.steps[1].cache_from,
            vec![
                "gcr.io/p/demo-build-env:feature-x",
                "gcr.io/p/demo-web:feature-x",
                "gcr.io/p/demo-web:master",
            ]
        );
    }

    #[test]
    fn test_production_branch_pushes_latest() {
        let plan = plan(&spec(), &registry(), &ci("master"));

        assert_eq!(
            plan.push,
            vec![
                "gcr.io/p/demo-build-env:master",
                "gcr.io/p/demo-build-env:abcd123",
                "gcr.io/p/demo-build-env:latest",
                "gcr.io/p/demo-web:master",
                "gcr.io/p/demo-web:abcd123",
                "gcr.io/p/demo-web:latest",
            ]
        );
    }

    #[test]
    fn test_fixed_tag_plan() {
        let spec = spec().with_fixed_tag(Some("v1".into()));
        let plan = plan(&spec, &registry(), &ci("master"));

        assert_eq!(
            plan.push,
            vec!["gcr.io/p/demo-build-env:v1", "gcr.io/p/demo-web:v1"]
        );
        assert_eq!(
            plan.steps[1].cache_from,
            vec![
                "gcr.io/p/demo-build-env:v1",
                "gcr.io/p/demo-web:v1",
                "gcr.io/p/demo-web:master",
            ]
        );
    }

    #[test]
    fn test_local_plan() {
        let plan = plan(&spec(), &registry(), &BuildContext::local());

        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.image, "web");
        assert_eq!(step.tags, vec!["gcr.io/p/demo-web:latest"]);
        assert_eq!(step.target, None);
        assert!(step.cache_from.is_empty());
        assert!(step.build_args.is_empty());
        assert_eq!(plan.push, vec!["gcr.io/p/demo-web:latest"]);
    }

    #[test]
    fn test_single_image_has_no_target() {
        let plan = plan(&ImageSpec::new("api"), &registry(), &ci("feature-x"));

        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].target, None);
    }

    #[test]
    fn test_commit_only_context() {
        let plan = plan(
            &ImageSpec::new("api"),
            &registry(),
            &BuildContext::ci("", "abcd123", Some("master".into())),
        );

        assert_eq!(plan.push, vec!["gcr.io/p/demo-api:abcd123"]);
        assert_eq!(plan.steps[0].cache_from, vec!["gcr.io/p/demo-api:master"]);
        assert!(plan.steps[0].build_args.is_empty());
    }
}
