//! Build engine: assembles the image archive and loads it into the daemon.
//!
//! The archive follows the `docker save` layout (`manifest.json`, a config
//! JSON, one `layer.tar` per layer) so any Docker-compatible daemon can
//! ingest it via `docker load`. Registry interaction is deliberately
//! absent; the base image reference is recorded in the image labels.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::builder::{BuildError, BuildOutput, BuildPlan};
use crate::events::{BuildEvent, EventBus};
use crate::layers::LayerConfiguration;

/// Platform-agnostic build engine seam.
///
/// The real engine talks to the daemon; orchestration tests substitute a
/// recording stub.
#[async_trait]
pub trait BuildExecutor: Send {
    /// Execute the build, applying `repo_tags` to the produced image.
    async fn execute(
        &mut self,
        plan: &BuildPlan,
        repo_tags: &[String],
        events: &EventBus,
    ) -> Result<BuildOutput, BuildError>;
}

/// Engine that builds an archive and streams it into the local daemon.
#[derive(Debug, Default)]
pub struct DaemonExecutor;

impl DaemonExecutor {
    pub fn new() -> Self {
        Self
    }

    fn create_scratch_dir(cache_dir: &Path) -> Result<PathBuf, BuildError> {
        let scratch = cache_dir.join(format!("build-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&scratch).map_err(|e| {
            BuildError::with_source(
                format!("failed to create build scratch directory {}", scratch.display()),
                e,
            )
        })?;
        Ok(scratch)
    }

    /// Produce one uncompressed layer tar plus its diff id.
    fn assemble_layer(layer: &LayerConfiguration) -> Result<(Vec<u8>, String), BuildError> {
        let mut builder = tar::Builder::new(Vec::new());

        for entry in &layer.entries {
            let data = std::fs::read(&entry.source).map_err(|e| {
                BuildError::with_source(
                    format!(
                        "failed to read {} for layer '{}'",
                        entry.source.display(),
                        layer.name
                    ),
                    e,
                )
            })?;

            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(entry.permissions.mode());
            header.set_mtime(0);
            header.set_cksum();

            let path = entry.target.as_str().trim_start_matches('/');
            builder.append_data(&mut header, path, data.as_slice()).map_err(|e| {
                BuildError::with_source(
                    format!("failed to add {} to layer '{}'", entry.target, layer.name),
                    e,
                )
            })?;
        }

        let bytes = builder
            .into_inner()
            .map_err(|e| BuildError::with_source(format!("failed to finish layer '{}'", layer.name), e))?;
        let diff_id = format!("{:x}", Sha256::digest(&bytes));
        Ok((bytes, diff_id))
    }

    fn image_config(plan: &BuildPlan, diff_ids: &[String]) -> Vec<u8> {
        let runtime = &plan.runtime;
        let exposed_ports: serde_json::Map<String, serde_json::Value> = runtime
            .exposed_ports
            .iter()
            .map(|port| (format!("{}/tcp", port), json!({})))
            .collect();
        let volumes: serde_json::Map<String, serde_json::Value> =
            runtime.volumes.iter().map(|volume| (volume.to_string(), json!({}))).collect();
        let env: Vec<String> =
            runtime.environment.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut labels = runtime.labels.clone();
        labels.insert("org.keel.base-image".to_string(), plan.base.to_string());

        let history: Vec<serde_json::Value> = plan
            .layers
            .iter()
            .map(|layer| json!({ "created_by": format!("keel: {} layer", layer.name) }))
            .collect();

        let config = json!({
            "architecture": go_arch(),
            "os": "linux",
            "created": chrono::Utc::now().to_rfc3339(),
            "config": {
                "Entrypoint": runtime.entrypoint,
                "Cmd": runtime.args,
                "Env": env,
                "WorkingDir": runtime.working_directory.as_ref().map(|p| p.to_string()),
                "ExposedPorts": exposed_ports,
                "Volumes": volumes,
                "Labels": labels,
            },
            "rootfs": {
                "type": "layers",
                "diff_ids": diff_ids.iter().map(|d| format!("sha256:{}", d)).collect::<Vec<_>>(),
            },
            "history": history,
        });

        // json! output is valid UTF-8 JSON; serialization cannot fail.
        serde_json::to_vec(&config).expect("image config serialization")
    }

    fn write_archive(
        scratch: &Path,
        config: &[u8],
        layers: &[(Vec<u8>, String)],
        repo_tags: &[String],
    ) -> Result<(PathBuf, String), BuildError> {
        let manifest = json!([{
            "Config": "config.json",
            "RepoTags": repo_tags,
            "Layers": layers.iter().map(|(_, d)| format!("{}/layer.tar", d)).collect::<Vec<_>>(),
        }]);
        let manifest_bytes =
            serde_json::to_vec(&manifest).expect("image manifest serialization");
        let digest = format!("{:x}", Sha256::digest(&manifest_bytes));

        let archive_path = scratch.join("image.tar.gz");
        let file = std::fs::File::create(&archive_path).map_err(|e| {
            BuildError::with_source(
                format!("failed to create image archive {}", archive_path.display()),
                e,
            )
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let archive_error = |e: std::io::Error| {
            BuildError::with_source("failed to write the image archive", e)
        };

        append_bytes(&mut builder, "config.json", config).map_err(archive_error)?;
        for (bytes, diff_id) in layers {
            append_bytes(&mut builder, &format!("{}/layer.tar", diff_id), bytes)
                .map_err(archive_error)?;
        }
        append_bytes(&mut builder, "manifest.json", &manifest_bytes).map_err(archive_error)?;

        let encoder = builder.into_inner().map_err(archive_error)?;
        let mut file = encoder.finish().map_err(archive_error)?;
        file.flush().map_err(archive_error)?;

        Ok((archive_path, digest))
    }
}

#[async_trait]
impl BuildExecutor for DaemonExecutor {
    #[instrument(skip_all, fields(target = %plan.target))]
    async fn execute(
        &mut self,
        plan: &BuildPlan,
        repo_tags: &[String],
        events: &EventBus,
    ) -> Result<BuildOutput, BuildError> {
        info!(target = %plan.target, layers = plan.layers.len(), "starting daemon build");

        let total = plan.layers.len() + 3;
        let mut step = 0;
        let mut progress = |description: String| {
            step += 1;
            events.publish(BuildEvent::Step { index: step, total, description });
        };

        let scratch = Self::create_scratch_dir(&plan.containerizer.cache_dir)?;

        let mut layers = Vec::with_capacity(plan.layers.len());
        for layer in &plan.layers {
            progress(format!("assembling {} layer", layer.name));
            let (bytes, diff_id) = Self::assemble_layer(layer)?;
            debug!(layer = %layer.name, diff_id = %diff_id, size = bytes.len(), "layer assembled");
            layers.push((bytes, diff_id));
        }

        progress("generating image configuration".to_string());
        let diff_ids: Vec<String> = layers.iter().map(|(_, d)| d.clone()).collect();
        let config = Self::image_config(plan, &diff_ids);
        let image_id = format!("{:x}", Sha256::digest(&config));

        progress("writing image archive".to_string());
        let (archive_path, digest) = Self::write_archive(&scratch, &config, &layers, repo_tags)?;

        progress("loading image into the daemon".to_string());
        plan.containerizer
            .client
            .load(&archive_path)
            .await
            .map_err(|e| BuildError::with_source("the daemon rejected the image archive", e))?;

        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            warn!(scratch = %scratch.display(), "failed to clean build scratch directory: {}", e);
        }

        info!(image_id = %image_id, "image loaded into daemon");
        Ok(BuildOutput {
            image_id: format!("sha256:{}", image_id),
            digest: format!("sha256:{}", digest),
            repo_tags: repo_tags.to_vec(),
        })
    }
}

fn append_bytes<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)
}

/// Map the host architecture to the GOARCH names image configs use.
fn go_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}
