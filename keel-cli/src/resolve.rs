//! Configuration resolution.
//!
//! Sequences the collaborators — path validation, reference parsing, the
//! base-image version policy, credential lookup, cache-directory creation,
//! project analysis — and unifies their error surface into the failure
//! union. No collaborator output is reinterpreted here.

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use keel_core::builder::{BuildPlan, Containerizer, RuntimeSpec};
use keel_core::credentials;
use keel_core::layers::FilePermissions;
use keel_core::paths;
use keel_core::project::ProjectProperties;
use keel_core::{AbsoluteUnixPath, BuildEvent, DockerClient, EventBus, ImageReference};

use crate::config::BuildConfig;
use crate::error::DaemonBuildError;

/// Resolve the build request into a plan ready for invocation.
pub fn resolve(
    config: &BuildConfig,
    client: DockerClient,
    events: &EventBus,
) -> Result<BuildPlan, DaemonBuildError> {
    let app_root = AbsoluteUnixPath::parse(&config.app_root)
        .map_err(|e| DaemonBuildError::InvalidAppRoot { value: e.value })?;

    let working_directory = config
        .working_directory
        .as_deref()
        .map(AbsoluteUnixPath::parse)
        .transpose()
        .map_err(|e| DaemonBuildError::InvalidWorkingDirectory { value: e.value })?;

    let volumes = config
        .volumes
        .iter()
        .map(|volume| AbsoluteUnixPath::parse(volume))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DaemonBuildError::InvalidContainerVolume { value: e.value })?;

    let base = ImageReference::parse(&config.base_image)
        .map_err(DaemonBuildError::configuration)?;
    ProjectProperties::validate_base_image_version(&base)
        .map_err(DaemonBuildError::configuration)?;

    let target = match &config.target_image {
        Some(reference) => {
            ImageReference::parse(reference).map_err(DaemonBuildError::configuration)?
        }
        None => {
            let derived = format!("{}:{}", config.project_name, config.project_version);
            ImageReference::parse(&derived).map_err(DaemonBuildError::configuration)?
        }
    };

    let base_credential = credentials::retrieve(base.registry_or_default(), &config.registries)
        .map_err(DaemonBuildError::configuration)?;
    let base_credential_present = base_credential.is_some();
    debug!(
        registry = base.registry_or_default(),
        present = base_credential_present,
        "base registry credential lookup"
    );

    let cache_dir = ensure_cache_dir(config)?;

    let extra_permissions = convert_permissions(&config.extra_permissions)?;
    let properties = ProjectProperties::analyze(
        &config.project_dir,
        &app_root,
        Some(&config.extra_directory),
        &extra_permissions,
        if config.entrypoint.is_empty() { None } else { Some(config.entrypoint.clone()) },
    )
    .map_err(DaemonBuildError::configuration)?;

    events.publish(BuildEvent::info(format!(
        "Using base image {} and target {}",
        base, target
    )));

    let runtime = RuntimeSpec {
        entrypoint: properties.entrypoint,
        args: config.args.clone(),
        environment: config.environment.clone(),
        working_directory,
        volumes,
        exposed_ports: config.ports.clone(),
        labels: config.labels.clone(),
    };

    Ok(BuildPlan {
        target,
        base,
        base_credential_present,
        layers: properties.layers,
        runtime,
        containerizer: Containerizer::to_docker_daemon(client, cache_dir),
    })
}

fn ensure_cache_dir(config: &BuildConfig) -> Result<PathBuf, DaemonBuildError> {
    let result = match &config.cache_dir {
        Some(dir) => std::fs::create_dir_all(dir).map(|_| dir.clone()),
        None => paths::ensure_cache_dir(),
    };
    result.map_err(|e| DaemonBuildError::Configuration {
        message: format!("failed to create the build cache directory: {}", e),
        source: Some(Box::new(e)),
    })
}

fn convert_permissions(
    raw: &HashMap<String, String>,
) -> Result<HashMap<String, FilePermissions>, DaemonBuildError> {
    raw.iter()
        .map(|(path, value)| {
            FilePermissions::parse_octal(path, value)
                .map(|permissions| (path.clone(), permissions))
                .map_err(DaemonBuildError::configuration)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, CliOverrides, Manifest};
    use std::path::Path;

    fn config_for(project_dir: &Path) -> BuildConfig {
        let mut config = BuildConfig::assemble(
            project_dir.to_path_buf(),
            Manifest::default(),
            CliOverrides::default(),
        );
        config.base_image = "debian:stable-slim".to_string();
        config.cache_dir = Some(project_dir.join("cache"));
        config
    }

    fn scaffold() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin/app"), b"#!/bin/sh").unwrap();
        tmp
    }

    #[test]
    fn test_resolve_produces_plan() {
        let tmp = scaffold();
        let config = config_for(tmp.path());
        let client = DockerClient::new(None, HashMap::new());

        let plan = resolve(&config, client, &EventBus::new()).unwrap();

        assert_eq!(plan.target.repo_tag(), "app:0.1.0");
        assert_eq!(plan.base.repo_tag(), "debian:stable-slim");
        assert_eq!(plan.layers.len(), 1);
        assert_eq!(plan.runtime.entrypoint, vec!["/app/bin/app".to_string()]);
    }

    #[test]
    fn test_resolve_rejects_relative_app_root() {
        let tmp = scaffold();
        let mut config = config_for(tmp.path());
        config.app_root = "relative/path".to_string();
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        match err {
            DaemonBuildError::InvalidAppRoot { value } => assert_eq!(value, "relative/path"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_rejects_relative_volume() {
        let tmp = scaffold();
        let mut config = config_for(tmp.path());
        config.volumes = vec!["/data".to_string(), "scratch".to_string()];
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        assert!(matches!(
            err,
            DaemonBuildError::InvalidContainerVolume { value } if value == "scratch"
        ));
    }

    #[test]
    fn test_resolve_classifies_bad_base_reference() {
        let tmp = scaffold();
        let mut config = config_for(tmp.path());
        config.base_image = "Not A Reference".to_string();
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        assert!(matches!(err, DaemonBuildError::Configuration { .. }));
    }

    #[test]
    fn test_resolve_classifies_outdated_default_base() {
        let tmp = scaffold();
        let mut config = config_for(tmp.path());
        config.base_image = "ghcr.io/keel-images/runtime:7".to_string();
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        assert!(matches!(err, DaemonBuildError::Configuration { .. }));
    }

    #[test]
    fn test_resolve_classifies_entrypoint_inference_failure() {
        let tmp = tempfile::tempdir().unwrap();
        // No bin/ directory and no explicit entrypoint.
        let config = config_for(tmp.path());
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        match err {
            DaemonBuildError::Configuration { message, .. } => {
                assert!(message.contains("entry point"), "message: {}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_classifies_bad_permission_override() {
        let tmp = scaffold();
        let mut config = config_for(tmp.path());
        config.extra_permissions.insert("/etc/app.conf".to_string(), "999".to_string());
        let client = DockerClient::new(None, HashMap::new());

        let err = resolve(&config, client, &EventBus::new()).unwrap_err();
        assert!(matches!(err, DaemonBuildError::Configuration { .. }));
    }
}
