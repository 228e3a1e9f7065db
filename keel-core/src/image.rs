//! Image reference parsing and formatting.
//!
//! A reference is `[registry/]repository[:tag]`, defaulting to Docker Hub
//! and the `latest` tag the way the docker CLI does.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Registry assumed when the reference does not name one.
pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

/// Tag assumed when the reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// Error type for image reference parsing.
#[derive(Debug, Error)]
#[error("invalid image reference '{reference}': {reason}")]
pub struct ImageError {
    pub reference: String,
    pub reason: String,
}

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host (e.g., "ghcr.io"), `None` for Docker Hub.
    pub registry: Option<String>,
    /// Repository path (e.g., "library/nginx").
    pub repository: String,
    /// Tag, defaulting to "latest".
    pub tag: String,
}

impl ImageReference {
    /// Parses a reference string.
    ///
    /// The first component counts as a registry when it contains a dot,
    /// a colon, or is `localhost` — the same heuristic the docker CLI
    /// applies.
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        if reference.is_empty() {
            return Err(ImageError {
                reference: reference.to_string(),
                reason: "reference is empty".to_string(),
            });
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(ImageError {
                reference: reference.to_string(),
                reason: "reference contains whitespace".to_string(),
            });
        }

        let (registry, remainder) = match reference.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest)
            }
            _ => (None, reference),
        };

        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (remainder, DEFAULT_TAG),
        };

        if repository.is_empty() {
            return Err(ImageError {
                reference: reference.to_string(),
                reason: "repository is empty".to_string(),
            });
        }
        if tag.is_empty() {
            return Err(ImageError {
                reference: reference.to_string(),
                reason: "tag is empty".to_string(),
            });
        }
        let valid_repo = repository
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c));
        if !valid_repo {
            return Err(ImageError {
                reference: reference.to_string(),
                reason: format!("invalid repository '{}'", repository),
            });
        }

        Ok(Self { registry, repository: repository.to_string(), tag: tag.to_string() })
    }

    /// Registry host to contact for this reference.
    pub fn registry_or_default(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// The `repository:tag` form used for daemon-side repo tags.
    pub fn repo_tag(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}:{}", registry, self.repository, self.tag),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repo_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let reference = ImageReference::parse("nginx").unwrap();
        assert_eq!(reference.registry, None);
        assert_eq!(reference.repository, "nginx");
        assert_eq!(reference.tag, "latest");
    }

    #[test]
    fn test_parse_with_tag() {
        let reference = ImageReference::parse("myapp:v1.0").unwrap();
        assert_eq!(reference.repository, "myapp");
        assert_eq!(reference.tag, "v1.0");
    }

    #[test]
    fn test_parse_with_registry() {
        let reference = ImageReference::parse("ghcr.io/acme/myapp:2").unwrap();
        assert_eq!(reference.registry.as_deref(), Some("ghcr.io"));
        assert_eq!(reference.repository, "acme/myapp");
        assert_eq!(reference.tag, "2");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let reference = ImageReference::parse("localhost:5000/myapp").unwrap();
        assert_eq!(reference.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(reference.repository, "myapp");
        assert_eq!(reference.tag, "latest");
    }

    #[test]
    fn test_parse_namespace_without_registry() {
        let reference = ImageReference::parse("acme/myapp").unwrap();
        assert_eq!(reference.registry, None);
        assert_eq!(reference.repository, "acme/myapp");
    }

    #[test]
    fn test_parse_empty_rejected() {
        assert!(ImageReference::parse("").is_err());
    }

    #[test]
    fn test_parse_whitespace_rejected() {
        assert!(ImageReference::parse("my app:latest").is_err());
    }

    #[test]
    fn test_parse_uppercase_repository_rejected() {
        assert!(ImageReference::parse("MyApp:latest").is_err());
    }

    #[test]
    fn test_repo_tag_round_trip() {
        let reference = ImageReference::parse("ghcr.io/acme/myapp:2").unwrap();
        assert_eq!(reference.repo_tag(), "ghcr.io/acme/myapp:2");
        assert_eq!(reference.to_string(), "ghcr.io/acme/myapp:2");
    }
}
