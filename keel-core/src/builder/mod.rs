//! Image building for keel.
//!
//! This module owns the resolved build plan, the engine that assembles an
//! image archive and hands it to the daemon, and the runner that wires
//! provenance outputs around an invocation.

pub mod executor;
pub mod runner;

pub use executor::{BuildExecutor, DaemonExecutor};
pub use runner::DaemonBuild;

use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::docker::DockerClient;
use crate::image::ImageReference;
use crate::layers::LayerConfiguration;
use crate::unix_path::AbsoluteUnixPath;

/// Error type for build execution.
///
/// The message is the engine's own description of what failed; the source
/// is the underlying cause, kept separate so callers can surface the
/// message and log the chain.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BuildError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Split into message and underlying cause, dropping the wrapper.
    pub fn into_parts(self) -> (String, Option<Box<dyn std::error::Error + Send + Sync>>) {
        (self.message, self.source)
    }
}

/// Container runtime settings baked into the image config.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSpec {
    pub entrypoint: Vec<String>,
    pub args: Vec<String>,
    /// BTreeMap so the generated config is byte-stable across runs.
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<AbsoluteUnixPath>,
    pub volumes: Vec<AbsoluteUnixPath>,
    pub exposed_ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
}

/// Handle for the "to local daemon" build mode.
///
/// Sibling modes (to registry, to archive) would carry their own handle;
/// only the daemon mode exists here.
#[derive(Debug, Clone)]
pub struct Containerizer {
    pub client: DockerClient,
    pub cache_dir: PathBuf,
}

impl Containerizer {
    pub fn to_docker_daemon(client: DockerClient, cache_dir: PathBuf) -> Self {
        Self { client, cache_dir }
    }
}

/// Fully resolved build plan, consumed (not mutated) by the runner.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub target: ImageReference,
    pub base: ImageReference,
    pub base_credential_present: bool,
    pub layers: Vec<LayerConfiguration>,
    pub runtime: RuntimeSpec,
    pub containerizer: Containerizer,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Image id (`sha256:` + hash of the image config).
    pub image_id: String,
    /// Image digest (`sha256:` + hash of the image manifest).
    pub digest: String,
    /// Every repo tag applied to the loaded image.
    pub repo_tags: Vec<String>,
}
