//! Project analysis.
//!
//! Turns a keel project layout into the data the build needs: the layer
//! set, the container entry point, and the base-image version check.
//!
//! Expected layout under the project directory:
//!
//! ```text
//! lib/        third-party artifacts   -> <app_root>/lib      (dependencies layer)
//! resources/  static assets           -> <app_root>/resources (resources layer)
//! bin/        application executables -> <app_root>/bin      (application layer)
//! <extra>/    arbitrary overlay files -> /                   (extra files layer)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::image::ImageReference;
use crate::layers::{FilePermissions, LayerConfiguration};
use crate::unix_path::AbsoluteUnixPath;

/// Repository family of the default base image, subject to the minimum
/// version policy.
pub const DEFAULT_BASE_IMAGE_FAMILY: &str = "ghcr.io/keel-images/runtime";

/// Oldest default-base-image version still supported.
pub const MIN_BASE_IMAGE_VERSION: u32 = 8;

/// Error type for project analysis.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read project directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not infer an entry point: {reason}")]
    EntrypointInference { reason: String },

    #[error(
        "base image '{reference}' is no longer supported; use {family}:{minimum} or newer"
    )]
    UnsupportedBaseImage { reference: String, family: String, minimum: u32 },
}

/// Analyzed project: layers ready for the engine plus the entry point.
#[derive(Debug)]
pub struct ProjectProperties {
    pub layers: Vec<LayerConfiguration>,
    pub entrypoint: Vec<String>,
}

impl ProjectProperties {
    /// Analyze the project directory.
    ///
    /// `explicit_entrypoint` short-circuits inference when the manifest
    /// sets one. Missing layout directories simply produce no layer.
    pub fn analyze(
        project_dir: &Path,
        app_root: &AbsoluteUnixPath,
        extra_directory: Option<&Path>,
        extra_permissions: &HashMap<String, FilePermissions>,
        explicit_entrypoint: Option<Vec<String>>,
    ) -> Result<Self, ProjectError> {
        let mut layers = Vec::new();

        let mut dependencies = LayerConfiguration::new("dependencies");
        collect_entries(
            &project_dir.join("lib"),
            &app_root.join("lib"),
            FilePermissions::DEFAULT_FILE,
            &HashMap::new(),
            &mut dependencies,
        )?;

        let mut resources = LayerConfiguration::new("resources");
        collect_entries(
            &project_dir.join("resources"),
            &app_root.join("resources"),
            FilePermissions::DEFAULT_FILE,
            &HashMap::new(),
            &mut resources,
        )?;

        let mut application = LayerConfiguration::new("application");
        collect_entries(
            &project_dir.join("bin"),
            &app_root.join("bin"),
            FilePermissions::DEFAULT_EXECUTABLE,
            &HashMap::new(),
            &mut application,
        )?;

        let entrypoint = match explicit_entrypoint {
            Some(entrypoint) if !entrypoint.is_empty() => entrypoint,
            _ => infer_entrypoint(project_dir, app_root)?,
        };

        for layer in [dependencies, resources, application] {
            if layer.is_empty() {
                debug!(layer = %layer.name, "skipping empty layer");
            } else {
                layers.push(layer);
            }
        }

        if let Some(extra) = extra_directory {
            let mut extra_layer = LayerConfiguration::new("extra files");
            let root = AbsoluteUnixPath::parse("/").expect("root is absolute");
            collect_entries(
                extra,
                &root,
                FilePermissions::DEFAULT_FILE,
                extra_permissions,
                &mut extra_layer,
            )?;
            if !extra_layer.is_empty() {
                layers.push(extra_layer);
            }
        }

        Ok(Self { layers, entrypoint })
    }

    /// Enforce the minimum version policy for the default base image
    /// family. Foreign base images pass through untouched.
    pub fn validate_base_image_version(base: &ImageReference) -> Result<(), ProjectError> {
        let family = format!("{}/{}", base.registry_or_default(), base.repository);
        if family != DEFAULT_BASE_IMAGE_FAMILY {
            return Ok(());
        }
        if base.tag == "latest" {
            return Ok(());
        }

        let supported = base
            .tag
            .split(['.', '-'])
            .next()
            .and_then(|major| major.parse::<u32>().ok())
            .is_some_and(|major| major >= MIN_BASE_IMAGE_VERSION);

        if supported {
            Ok(())
        } else {
            Err(ProjectError::UnsupportedBaseImage {
                reference: base.to_string(),
                family: DEFAULT_BASE_IMAGE_FAMILY.to_string(),
                minimum: MIN_BASE_IMAGE_VERSION,
            })
        }
    }
}

/// Recursively map `source` under `target`, sorted for reproducible layers.
fn collect_entries(
    source: &Path,
    target: &AbsoluteUnixPath,
    default_permissions: FilePermissions,
    overrides: &HashMap<String, FilePermissions>,
    layer: &mut LayerConfiguration,
) -> Result<(), ProjectError> {
    if !source.is_dir() {
        return Ok(());
    }

    let mut children: Vec<_> = std::fs::read_dir(source)
        .map_err(|source_err| ProjectError::Io { path: source.to_path_buf(), source: source_err })?
        .collect::<Result<_, _>>()
        .map_err(|source_err| ProjectError::Io { path: source.to_path_buf(), source: source_err })?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        let child_target = target.join(&name);
        let child_path = child.path();

        if child_path.is_dir() {
            collect_entries(&child_path, &child_target, default_permissions, overrides, layer)?;
        } else {
            let permissions = overrides
                .get(child_target.as_str())
                .copied()
                .unwrap_or(default_permissions);
            layer.add_entry(child_path, child_target, permissions);
        }
    }
    Ok(())
}

/// Infer the container entry point from the `bin/` directory.
///
/// Exactly one top-level file means that file is the entry point; anything
/// else needs an explicit `container.entrypoint`.
fn infer_entrypoint(
    project_dir: &Path,
    app_root: &AbsoluteUnixPath,
) -> Result<Vec<String>, ProjectError> {
    let bin = project_dir.join("bin");
    if !bin.is_dir() {
        return Err(ProjectError::EntrypointInference {
            reason: "bin/ does not exist and container.entrypoint is not set".to_string(),
        });
    }

    let mut candidates: Vec<String> = std::fs::read_dir(&bin)
        .map_err(|source| ProjectError::Io { path: bin.clone(), source })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    candidates.sort();

    match candidates.as_slice() {
        [single] => Ok(vec![app_root.join("bin").join(single).as_str().to_string()]),
        [] => Err(ProjectError::EntrypointInference {
            reason: "bin/ is empty and container.entrypoint is not set".to_string(),
        }),
        many => Err(ProjectError::EntrypointInference {
            reason: format!(
                "bin/ contains multiple executables ({}); set container.entrypoint",
                many.join(", ")
            ),
        }),
    }
}
