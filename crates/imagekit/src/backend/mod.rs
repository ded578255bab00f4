//! Backend abstraction for container engines.

pub mod docker;

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Arguments for one image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest<'a> {
    /// Build context directory
    pub context: &'a Path,
    pub tags: &'a [String],
    pub target: Option<&'a str>,
    /// Cache images that were pulled successfully
    pub cache_from: &'a [String],
    pub build_args: &'a [String],
}

/// Backend trait for container engine operations.
pub trait Backend: Send + Sync {
    /// Build an image.
    fn build(&self, request: &BuildRequest<'_>) -> Result<()>;

    /// Pull an image by reference.
    fn pull(&self, image: &str) -> Result<()>;

    /// Push an image by reference.
    fn push(&self, image: &str) -> Result<()>;
}

/// A build recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuild {
    pub context: PathBuf,
    pub tags: Vec<String>,
    pub target: Option<String>,
    pub cache_from: Vec<String>,
    pub build_args: Vec<String>,
}

/// In-memory backend for tests.
///
/// Pulls succeed only for images registered with
/// [`MockBackend::add_remote_image`]; pushes register the image remotely.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    remote: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    builds: Arc<Mutex<Vec<RecordedBuild>>>,
    pulls: Arc<Mutex<Vec<String>>>,
    pushes: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an image pullable.
    pub fn add_remote_image(&self, image: impl Into<String>) {
        self.remote.lock().unwrap().insert(image.into());
    }

    /// Make builds tagged with, or pushes of, `image` fail.
    pub fn fail_on(&self, image: impl Into<String>) {
        self.failing.lock().unwrap().insert(image.into());
    }

    pub fn builds(&self) -> Vec<RecordedBuild> {
        self.builds.lock().unwrap().clone()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    fn fails(&self, image: &str) -> bool {
        self.failing.lock().unwrap().contains(image)
    }
}

impl Backend for MockBackend {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        self.builds.lock().unwrap().push(RecordedBuild {
            context: request.context.to_path_buf(),
            tags: request.tags.to_vec(),
            target: request.target.map(String::from),
            cache_from: request.cache_from.to_vec(),
            build_args: request.build_args.to_vec(),
        });

        match request.tags.iter().find(|tag| self.fails(tag)) {
            Some(tag) => Err(Error::CommandFailed {
                command: "build".to_string(),
                image: tag.clone(),
                code: Some(1),
            }),
            None => Ok(()),
        }
    }

    fn pull(&self, image: &str) -> Result<()> {
        self.pulls.lock().unwrap().push(image.to_string());

        if self.remote.lock().unwrap().contains(image) {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: "pull".to_string(),
                image: image.to_string(),
                code: Some(1),
            })
        }
    }

    fn push(&self, image: &str) -> Result<()> {
        self.pushes.lock().unwrap().push(image.to_string());

        if self.fails(image) {
            return Err(Error::CommandFailed {
                command: "push".to_string(),
                image: image.to_string(),
                code: Some(1),
            });
        }
        self.add_remote_image(image);
        Ok(())
    }
}
