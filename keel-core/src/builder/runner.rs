//! Build runner for the "to local daemon" mode.
//!
//! Wires provenance outputs around an engine invocation: the caller picks
//! the mode and the artifact paths up front, then hands over a resolved
//! plan and an executor.

use std::path::PathBuf;
use tracing::info;

use crate::builder::{BuildError, BuildExecutor, BuildOutput, BuildPlan};
use crate::events::{BuildEvent, EventBus};
use crate::image::ImageReference;

/// One build-to-daemon invocation.
#[derive(Debug)]
pub struct DaemonBuild {
    target: ImageReference,
    additional_tags: Vec<String>,
    digest_path: Option<PathBuf>,
    id_path: Option<PathBuf>,
}

impl DaemonBuild {
    /// Select the "to local daemon" build mode for `target`.
    pub fn to_docker_daemon(target: ImageReference, additional_tags: Vec<String>) -> Self {
        Self { target, additional_tags, digest_path: None, id_path: None }
    }

    /// Record the image digest at `path` after a successful build.
    pub fn write_image_digest(mut self, path: PathBuf) -> Self {
        self.digest_path = Some(path);
        self
    }

    /// Record the image id at `path` after a successful build.
    pub fn write_image_id(mut self, path: PathBuf) -> Self {
        self.id_path = Some(path);
        self
    }

    /// Every repo tag the daemon image ends up with: the target reference
    /// plus each additional tag on the target repository.
    pub fn repo_tags(&self) -> Vec<String> {
        let mut tags = vec![self.target.repo_tag()];
        for tag in &self.additional_tags {
            let mut reference = self.target.clone();
            reference.tag = tag.clone();
            tags.push(reference.repo_tag());
        }
        tags
    }

    /// Run the build and persist provenance artifacts.
    pub async fn run(
        &self,
        plan: &BuildPlan,
        executor: &mut dyn BuildExecutor,
        events: &EventBus,
    ) -> Result<BuildOutput, BuildError> {
        events.publish(BuildEvent::lifecycle(format!(
            "Containerizing application to Docker daemon as {}...",
            self.repo_tags().join(", ")
        )));

        let output = executor.execute(plan, &self.repo_tags(), events).await?;

        if let Some(path) = &self.digest_path {
            std::fs::write(path, &output.digest).map_err(|e| {
                BuildError::with_source(
                    format!("failed to write image digest to {}", path.display()),
                    e,
                )
            })?;
        }
        if let Some(path) = &self.id_path {
            std::fs::write(path, &output.image_id).map_err(|e| {
                BuildError::with_source(format!("failed to write image id to {}", path.display()), e)
            })?;
        }

        info!(image_id = %output.image_id, digest = %output.digest, "build complete");
        events.publish(BuildEvent::lifecycle(format!(
            "Built image to Docker daemon as {}",
            output.repo_tags.join(", ")
        )));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Containerizer, RuntimeSpec};
    use crate::docker::DockerClient;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedOutputExecutor;

    #[async_trait]
    impl BuildExecutor for FixedOutputExecutor {
        async fn execute(
            &mut self,
            _plan: &BuildPlan,
            repo_tags: &[String],
            _events: &EventBus,
        ) -> Result<BuildOutput, BuildError> {
            Ok(BuildOutput {
                image_id: "sha256:aaaa".to_string(),
                digest: "sha256:bbbb".to_string(),
                repo_tags: repo_tags.to_vec(),
            })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl BuildExecutor for FailingExecutor {
        async fn execute(
            &mut self,
            _plan: &BuildPlan,
            _repo_tags: &[String],
            _events: &EventBus,
        ) -> Result<BuildOutput, BuildError> {
            Err(BuildError::new("engine exploded"))
        }
    }

    fn plan(cache_dir: PathBuf) -> BuildPlan {
        BuildPlan {
            target: ImageReference::parse("myapp:1.0").unwrap(),
            base: ImageReference::parse("debian:stable-slim").unwrap(),
            base_credential_present: false,
            layers: Vec::new(),
            runtime: RuntimeSpec::default(),
            containerizer: Containerizer::to_docker_daemon(
                DockerClient::new(None, HashMap::new()),
                cache_dir,
            ),
        }
    }

    #[test]
    fn test_repo_tags_include_additional() {
        let build = DaemonBuild::to_docker_daemon(
            ImageReference::parse("ghcr.io/acme/myapp:1.0").unwrap(),
            vec!["latest".to_string(), "stable".to_string()],
        );
        assert_eq!(
            build.repo_tags(),
            vec![
                "ghcr.io/acme/myapp:1.0".to_string(),
                "ghcr.io/acme/myapp:latest".to_string(),
                "ghcr.io/acme/myapp:stable".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_writes_provenance() {
        let tmp = tempfile::tempdir().unwrap();
        let digest_path = tmp.path().join("image.digest");
        let id_path = tmp.path().join("image.id");

        let build =
            DaemonBuild::to_docker_daemon(ImageReference::parse("myapp:1.0").unwrap(), Vec::new())
                .write_image_digest(digest_path.clone())
                .write_image_id(id_path.clone());

        let events = EventBus::new();
        let mut executor = FixedOutputExecutor;
        let output =
            build.run(&plan(tmp.path().to_path_buf()), &mut executor, &events).await.unwrap();

        assert_eq!(output.image_id, "sha256:aaaa");
        assert_eq!(std::fs::read_to_string(&digest_path).unwrap(), "sha256:bbbb");
        assert_eq!(std::fs::read_to_string(&id_path).unwrap(), "sha256:aaaa");
    }

    #[tokio::test]
    async fn test_run_failure_leaves_no_provenance() {
        let tmp = tempfile::tempdir().unwrap();
        let digest_path = tmp.path().join("image.digest");
        let id_path = tmp.path().join("image.id");

        let build =
            DaemonBuild::to_docker_daemon(ImageReference::parse("myapp:1.0").unwrap(), Vec::new())
                .write_image_digest(digest_path.clone())
                .write_image_id(id_path.clone());

        let events = EventBus::new();
        let mut executor = FailingExecutor;
        let err = build
            .run(&plan(tmp.path().to_path_buf()), &mut executor, &events)
            .await
            .unwrap_err();

        assert_eq!(err.message(), "engine exploded");
        assert!(!digest_path.exists());
        assert!(!id_path.exists());
    }
}
