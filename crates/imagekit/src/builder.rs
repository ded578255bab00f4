//! Execution of [`BuildPlan`]s.

use crate::backend::docker::DockerBackend;
use crate::backend::{Backend, BuildRequest};
use crate::error::Result;
use crate::plan::BuildPlan;
use std::collections::HashMap;
use std::path::Path;

/// Runs build plans against a container engine.
pub struct Builder {
    backend: Box<dyn Backend>,
}

impl Builder {
    /// Create a builder using the local `docker` CLI.
    pub fn new() -> Result<Self> {
        Ok(Self::with_backend(Box::new(DockerBackend::new()?)))
    }

    /// Create a builder with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Build every step in order.
    ///
    /// Cache images are pulled first; a pull failure only drops that image
    /// from the cache list. The first failing build stops the plan.
    pub fn build(&self, context: &Path, plan: &BuildPlan) -> Result<()> {
        let mut pulled: HashMap<&str, bool> = HashMap::new();

        for step in &plan.steps {
            let cache_from: Vec<String> = step
                .cache_from
                .iter()
                .filter(|image| {
                    *pulled
                        .entry(image.as_str())
                        .or_insert_with(|| self.pull_cache(image))
                })
                .cloned()
                .collect();

            log::info!("Building {}", step.tags.first().map_or(step.image.as_str(), String::as_str));
            self.backend.build(&BuildRequest {
                context,
                tags: &step.tags,
                target: step.target.as_deref(),
                cache_from: &cache_from,
                build_args: &step.build_args,
            })?;
        }

        Ok(())
    }

    /// Push every reference in order, stopping at the first failure.
    pub fn push(&self, plan: &BuildPlan) -> Result<()> {
        for image in &plan.push {
            log::info!("Pushing {image}");
            self.backend.push(image)?;
        }
        Ok(())
    }

    fn pull_cache(&self, image: &str) -> bool {
        match self.backend.pull(image) {
            Ok(()) => true,
            Err(e) => {
                log::info!("No cache found for image {image}.");
                log::debug!("{e}");
                false
            }
        }
    }
}
