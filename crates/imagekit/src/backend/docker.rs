//! Docker CLI backend.

use crate::backend::{Backend, BuildRequest};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Executable this backend drives.
pub const BINARY: &str = "docker";

/// Backend that executes real `docker` commands with BuildKit enabled.
pub struct DockerBackend {
    docker_path: PathBuf,
}

impl DockerBackend {
    /// Locate `docker` in PATH.
    pub fn new() -> Result<Self> {
        let docker_path = which::which(BINARY).map_err(|_| Error::NotInstalled)?;
        Ok(Self { docker_path })
    }

    fn run_docker(&self, args: &[String], image: &str, quiet: bool) -> Result<()> {
        log::debug!("Command: docker {}", args.join(" "));

        let mut command = Command::new(&self.docker_path);
        command.args(args).env("DOCKER_BUILDKIT", "1");
        if quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let subcommand = args.first().cloned().unwrap_or_default();
        let status = command.status().map_err(|source| Error::Spawn {
            command: subcommand.clone(),
            source,
        })?;

        log::debug!("Command exit code: {:?}", status.code());
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: subcommand,
                image: image.to_string(),
                code: status.code(),
            })
        }
    }
}

/// Arguments for `docker build`.
pub fn build_args(request: &BuildRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        // one log line per step in CI
        "--progress=plain".to_string(),
        // without inline cache metadata the pushed image cannot serve as --cache-from
        "--build-arg=BUILDKIT_INLINE_CACHE=1".to_string(),
    ];

    for build_arg in request.build_args {
        args.push("--build-arg".to_string());
        args.push(build_arg.clone());
    }

    if let Some(target) = request.target {
        args.push("--target".to_string());
        args.push(target.to_string());
    }

    for cache in request.cache_from {
        args.push("--cache-from".to_string());
        args.push(cache.clone());
    }

    for tag in request.tags {
        args.push("-t".to_string());
        args.push(tag.clone());
    }

    args.push(request.context.display().to_string());
    args
}

impl Backend for DockerBackend {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        let image = request.tags.first().cloned().unwrap_or_default();
        self.run_docker(&build_args(request), &image, false)
    }

    fn pull(&self, image: &str) -> Result<()> {
        self.run_docker(&["pull".to_string(), image.to_string()], image, true)
    }

    fn push(&self, image: &str) -> Result<()> {
        self.run_docker(&["push".to_string(), image.to_string()], image, false)
    }
}
