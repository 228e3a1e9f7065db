//! Registry credential lookup.
//!
//! Building to a local daemon never pushes, but the base image's registry
//! credentials still matter for diagnostics: remediation hints differ
//! depending on whether the user configured auth for the base registry.
//!
//! Lookup order: explicit manifest entry (inline password or environment
//! indirection), then the docker CLI's `config.json` auth store.

use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::paths;

/// Error type for credential retrieval.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("environment variable {variable} for registry {registry} is not set")]
    MissingEnvironment { registry: String, variable: String },

    #[error("failed to read auth store {path:?}: {source}")]
    AuthStoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed auth store {path:?}: {source}")]
    AuthStoreParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed auth entry for {registry} in {path:?}")]
    AuthEntryMalformed { registry: String, path: PathBuf },
}

/// A username/password pair for a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// An auth entry declared in the project manifest.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistryAuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Retrieve a credential for `registry`, or `None` when nothing is
/// configured anywhere.
pub fn retrieve(
    registry: &str,
    manifest_entries: &HashMap<String, RegistryAuthConfig>,
) -> Result<Option<Credential>, CredentialError> {
    if let Some(entry) = manifest_entries.get(registry) {
        if let Some(credential) = from_manifest_entry(registry, entry)? {
            debug!(registry, "using credentials from project manifest");
            return Ok(Some(credential));
        }
    }

    if let Some(credential) = from_auth_store(registry)? {
        debug!(registry, "using credentials from docker auth store");
        return Ok(Some(credential));
    }

    Ok(None)
}

fn from_manifest_entry(
    registry: &str,
    entry: &RegistryAuthConfig,
) -> Result<Option<Credential>, CredentialError> {
    let Some(username) = &entry.username else {
        return Ok(None);
    };

    let password = match (&entry.password, &entry.password_env) {
        (Some(password), _) => password.clone(),
        (None, Some(variable)) => std::env::var(variable).map_err(|_| {
            CredentialError::MissingEnvironment {
                registry: registry.to_string(),
                variable: variable.clone(),
            }
        })?,
        (None, None) => return Ok(None),
    };

    Ok(Some(Credential { username: username.clone(), password }))
}

fn from_auth_store(registry: &str) -> Result<Option<Credential>, CredentialError> {
    let Some(dir) = paths::docker_config_dir() else {
        return Ok(None);
    };
    let path = dir.join("config.json");
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|source| CredentialError::AuthStoreRead { path: path.clone(), source })?;
    let config: DockerConfig = serde_json::from_str(&content)
        .map_err(|source| CredentialError::AuthStoreParse { path: path.clone(), source })?;

    let Some(entry) = config.auths.get(registry) else {
        return Ok(None);
    };

    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Ok(Some(Credential { username: username.clone(), password: password.clone() }));
    }

    if let Some(auth) = &entry.auth {
        let decoded = base64::engine::general_purpose::STANDARD.decode(auth).map_err(|_| {
            CredentialError::AuthEntryMalformed { registry: registry.to_string(), path: path.clone() }
        })?;
        let decoded = String::from_utf8(decoded).map_err(|_| {
            CredentialError::AuthEntryMalformed { registry: registry.to_string(), path: path.clone() }
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            CredentialError::AuthEntryMalformed { registry: registry.to_string(), path: path.clone() }
        })?;
        return Ok(Some(Credential {
            username: username.to_string(),
            password: password.to_string(),
        }));
    }

    Err(CredentialError::AuthEntryMalformed { registry: registry.to_string(), path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(registry: &str, entry: RegistryAuthConfig) -> HashMap<String, RegistryAuthConfig> {
        let mut map = HashMap::new();
        map.insert(registry.to_string(), entry);
        map
    }

    #[test]
    fn test_manifest_inline_password() {
        let map = entries(
            "ghcr.io",
            RegistryAuthConfig {
                username: Some("alice".to_string()),
                password: Some("s3cret".to_string()),
                password_env: None,
            },
        );
        // Manifest entries win before the auth store is consulted.
        let credential = retrieve("ghcr.io", &map).unwrap().unwrap();
        assert_eq!(credential.username, "alice");
        assert_eq!(credential.password, "s3cret");
    }

    #[test]
    fn test_manifest_env_password_missing() {
        let map = entries(
            "ghcr.io",
            RegistryAuthConfig {
                username: Some("alice".to_string()),
                password: None,
                password_env: Some("KEEL_TEST_UNSET_PASSWORD".to_string()),
            },
        );
        let err = retrieve("ghcr.io", &map).unwrap_err();
        assert!(matches!(err, CredentialError::MissingEnvironment { .. }));
    }

    // DOCKER_CONFIG is process-global, so the store-backed cases share one
    // test body instead of racing each other.
    #[test]
    fn test_auth_store_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode("bob:hunter2");
        std::fs::write(
            tmp.path().join("config.json"),
            format!(r#"{{"auths":{{"ghcr.io":{{"auth":"{}"}}}}}}"#, encoded),
        )
        .unwrap();
        std::env::set_var("DOCKER_CONFIG", tmp.path());

        let credential = retrieve("ghcr.io", &HashMap::new()).unwrap().unwrap();
        assert_eq!(credential.username, "bob");
        assert_eq!(credential.password, "hunter2");

        // A registry absent from every source resolves to None.
        assert_eq!(retrieve("example.com", &HashMap::new()).unwrap(), None);

        std::env::remove_var("DOCKER_CONFIG");
    }
}
