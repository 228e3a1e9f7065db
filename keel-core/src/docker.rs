//! Client for a Docker-compatible local daemon.
//!
//! All interaction goes through the `docker` CLI so the tool works against
//! any daemon the user's docker binary is configured for (including remote
//! contexts), without speaking the engine API directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executable probed when no explicit path is configured.
pub const DEFAULT_EXECUTABLE: &str = "docker";

/// Error type for daemon operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to run {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed { command: String, status: String, stderr: String },

    #[error("I/O error talking to the daemon: {0}")]
    Io(#[from] std::io::Error),
}

/// Reachability seam for the orchestration flow.
///
/// The probe must not have side effects beyond the check itself.
#[async_trait]
pub trait DaemonProber: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Client for the local container-runtime daemon.
#[derive(Debug, Clone)]
pub struct DockerClient {
    executable: PathBuf,
    environment: HashMap<String, String>,
}

impl DockerClient {
    /// Create a client for an explicit executable, or the system default
    /// when `executable` is `None`.
    pub fn new(executable: Option<PathBuf>, environment: HashMap<String, String>) -> Self {
        Self {
            executable: executable.unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
            environment,
        }
    }

    /// The executable this client invokes.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.envs(&self.environment);
        command
    }

    /// Check whether the daemon executable can be invoked.
    ///
    /// Runs `<executable> --version`; a spawn failure or non-zero exit
    /// means the daemon tooling is not installed or not on the PATH.
    pub async fn is_installed(&self) -> bool {
        let result = self
            .command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(executable = %self.executable.display(), "daemon probe failed: {}", e);
                false
            }
        }
    }

    /// Load an image archive into the daemon, returning docker's output.
    pub async fn load(&self, archive: &Path) -> Result<String, DockerError> {
        debug!(archive = %archive.display(), "loading image archive into daemon");

        let mut child = self
            .command()
            .args(["load"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DockerError::Spawn {
                executable: self.executable.display().to_string(),
                source,
            })?;

        // Stream the archive rather than passing -i, so the daemon client
        // never needs read access to our scratch directory.
        let bytes = tokio::fs::read(archive).await?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&bytes).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(DockerError::CommandFailed {
                command: "docker load".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !stdout.is_empty() {
            debug!("docker load: {}", stdout);
        }
        Ok(stdout)
    }

    /// Apply an additional tag to an image already in the daemon.
    pub async fn tag(&self, image: &str, new_tag: &str) -> Result<(), DockerError> {
        let output = self
            .command()
            .args(["tag", image, new_tag])
            .output()
            .await
            .map_err(|source| DockerError::Spawn {
                executable: self.executable.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            warn!(image, new_tag, "docker tag failed");
            return Err(DockerError::CommandFailed {
                command: format!("docker tag {} {}", image, new_tag),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DaemonProber for DockerClient {
    async fn is_reachable(&self) -> bool {
        self.is_installed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_executable() {
        let client = DockerClient::new(None, HashMap::new());
        assert_eq!(client.executable(), Path::new(DEFAULT_EXECUTABLE));
    }

    #[test]
    fn test_explicit_executable() {
        let client = DockerClient::new(Some(PathBuf::from("/opt/podman")), HashMap::new());
        assert_eq!(client.executable(), Path::new("/opt/podman"));
    }

    #[tokio::test]
    async fn test_probe_missing_executable() {
        let client =
            DockerClient::new(Some(PathBuf::from("/nonexistent/docker-xyz")), HashMap::new());
        assert!(!client.is_installed().await);
    }
}
