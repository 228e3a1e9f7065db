//! Project manifest loading and build-request assembly.
//!
//! `keel.toml` supplies the project-level settings; CLI flags and `KEEL_*`
//! environment variables override them (CLI > environment > manifest).
//! The result is the immutable `BuildConfig` snapshot one invocation runs
//! against.

use anyhow::Context;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use keel_core::credentials::RegistryAuthConfig;
use keel_core::project::DEFAULT_BASE_IMAGE_FAMILY;

/// Packaging kind marking an aggregator project with nothing to build.
pub const META_PACKAGING: &str = "meta";

/// Manifest file name inside the project directory.
pub const MANIFEST_NAME: &str = "keel.toml";

/// Raw `keel.toml` contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub project: ProjectSection,
    pub build: BuildSection,
    pub daemon: DaemonSection,
    pub container: ContainerSection,
    pub extra: ExtraSection,
    pub registries: HashMap<String, RegistryAuthConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectSection {
    pub name: String,
    pub version: String,
    pub packaging: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            version: "0.1.0".to_string(),
            packaging: "app".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub skip: bool,
    pub output_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    pub executable: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSection {
    pub app_root: String,
    pub working_directory: Option<String>,
    pub volumes: Vec<String>,
    pub base_image: String,
    /// Explicit target reference; defaults to `<name>:<version>`.
    pub image: Option<String>,
    pub entrypoint: Vec<String>,
    pub args: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
}

impl Default for ContainerSection {
    fn default() -> Self {
        Self {
            app_root: "/app".to_string(),
            working_directory: None,
            volumes: Vec::new(),
            base_image: format!("{}:latest", DEFAULT_BASE_IMAGE_FAMILY),
            image: None,
            entrypoint: Vec::new(),
            args: Vec::new(),
            environment: BTreeMap::new(),
            ports: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraSection {
    /// Directory overlaid onto the container root, relative to the project.
    pub directory: PathBuf,
    /// Container path -> octal permission string.
    pub permissions: HashMap<String, String>,
}

impl Default for ExtraSection {
    fn default() -> Self {
        Self { directory: PathBuf::from("extra"), permissions: HashMap::new() }
    }
}

impl Manifest {
    /// Load the manifest from the project directory; a missing file means
    /// all defaults.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let path = project_dir.join(MANIFEST_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Overrides bound from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub skip: bool,
    pub output_dir: Option<PathBuf>,
    pub tags: Vec<String>,
    pub docker_executable: Option<PathBuf>,
    pub docker_env: Vec<(String, String)>,
}

/// Daemon locator: explicit executable or system default, plus env
/// overrides for the client process.
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    pub executable: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

/// Immutable snapshot of everything one build invocation needs.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub project_dir: PathBuf,
    pub project_name: String,
    pub project_version: String,
    pub packaging: String,
    pub skip: bool,
    pub daemon: DaemonConfig,
    pub app_root: String,
    pub working_directory: Option<String>,
    pub volumes: Vec<String>,
    pub base_image: String,
    pub target_image: Option<String>,
    pub entrypoint: Vec<String>,
    pub args: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
    pub extra_directory: PathBuf,
    pub extra_permissions: HashMap<String, String>,
    pub additional_tags: Vec<String>,
    pub output_dir: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub registries: HashMap<String, RegistryAuthConfig>,
}

impl BuildConfig {
    /// Merge manifest and CLI values into the request snapshot.
    pub fn assemble(project_dir: PathBuf, manifest: Manifest, cli: CliOverrides) -> Self {
        let mut environment = manifest.daemon.environment;
        environment.extend(cli.docker_env);

        let daemon = DaemonConfig {
            executable: cli.docker_executable.or(manifest.daemon.executable),
            environment,
        };

        let output_dir = cli
            .output_dir
            .or(manifest.build.output_dir)
            .map(|dir| if dir.is_absolute() { dir } else { project_dir.join(dir) })
            .unwrap_or_else(|| project_dir.join("build"));

        Self {
            project_name: manifest.project.name,
            project_version: manifest.project.version,
            packaging: manifest.project.packaging,
            skip: cli.skip || manifest.build.skip,
            daemon,
            app_root: manifest.container.app_root,
            working_directory: manifest.container.working_directory,
            volumes: manifest.container.volumes,
            base_image: manifest.container.base_image,
            target_image: manifest.container.image,
            entrypoint: manifest.container.entrypoint,
            args: manifest.container.args,
            environment: manifest.container.environment,
            ports: manifest.container.ports,
            labels: manifest.container.labels,
            extra_directory: project_dir.join(manifest.extra.directory),
            extra_permissions: manifest.extra.permissions,
            additional_tags: cli.tags,
            output_dir,
            cache_dir: manifest.build.cache_dir,
            registries: manifest.registries,
            project_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
name = "shipping-api"
version = "2.3.0"
packaging = "app"

[build]
skip = false

[daemon]
executable = "/usr/local/bin/docker"
environment = { DOCKER_HOST = "unix:///run/user/1000/docker.sock" }

[container]
app_root = "/srv/app"
working_directory = "/srv/app"
volumes = ["/data"]
base_image = "debian:stable-slim"
entrypoint = ["/srv/app/bin/shipping-api"]
ports = [8080]

[extra]
directory = "overlay"
permissions = { "/etc/app.conf" = "600" }

[registries."ghcr.io"]
username = "alice"
password_env = "GHCR_TOKEN"
"#;

    #[test]
    fn test_parse_sample_manifest() {
        let manifest: Manifest = toml::from_str(SAMPLE).unwrap();
        assert_eq!(manifest.project.name, "shipping-api");
        assert_eq!(manifest.container.app_root, "/srv/app");
        assert_eq!(manifest.container.ports, vec![8080]);
        assert_eq!(
            manifest.daemon.executable.as_deref(),
            Some(Path::new("/usr/local/bin/docker"))
        );
        assert_eq!(manifest.extra.permissions["/etc/app.conf"], "600");
        assert!(manifest.registries.contains_key("ghcr.io"));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let manifest: Manifest = toml::from_str("").unwrap();
        assert_eq!(manifest.project.packaging, "app");
        assert_eq!(manifest.container.app_root, "/app");
        assert!(manifest.container.base_image.starts_with(DEFAULT_BASE_IMAGE_FAMILY));
        assert!(!manifest.build.skip);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Manifest>("[project]\nnombre = \"x\"\n").is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let manifest: Manifest = toml::from_str(SAMPLE).unwrap();
        let cli = CliOverrides {
            skip: true,
            output_dir: Some(PathBuf::from("/tmp/out")),
            tags: vec!["latest".to_string()],
            docker_executable: Some(PathBuf::from("/opt/podman")),
            docker_env: vec![("DOCKER_HOST".to_string(), "tcp://10.0.0.2:2375".to_string())],
        };
        let config = BuildConfig::assemble(PathBuf::from("/proj"), manifest, cli);

        assert!(config.skip);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.daemon.executable.as_deref(), Some(Path::new("/opt/podman")));
        assert_eq!(config.daemon.environment["DOCKER_HOST"], "tcp://10.0.0.2:2375");
        assert_eq!(config.additional_tags, vec!["latest".to_string()]);
    }

    #[test]
    fn test_relative_output_dir_anchored_to_project() {
        let config = BuildConfig::assemble(
            PathBuf::from("/proj"),
            Manifest::default(),
            CliOverrides::default(),
        );
        assert_eq!(config.output_dir, PathBuf::from("/proj/build"));
        assert_eq!(config.extra_directory, PathBuf::from("/proj/extra"));
    }
}
