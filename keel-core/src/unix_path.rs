//! Container-side path handling.
//!
//! Paths inside the image always use the Unix convention regardless of the
//! host platform, so they are kept as validated strings rather than
//! `std::path::PathBuf`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error for a path that is not absolute in the Unix convention.
#[derive(Debug, Error)]
#[error("not an absolute Unix-style path: {value}")]
pub struct PathError {
    /// The offending value, verbatim.
    pub value: String,
}

/// An absolute Unix-style path inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsoluteUnixPath(String);

impl AbsoluteUnixPath {
    /// Parses a container path, requiring the Unix absolute form.
    ///
    /// Backslashes and drive prefixes are rejected so that Windows-style
    /// paths fail loudly instead of producing a broken image layout.
    pub fn parse(value: &str) -> Result<Self, PathError> {
        if !value.starts_with('/') || value.contains('\\') {
            return Err(PathError { value: value.to_string() });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a relative component, collapsing duplicate separators.
    pub fn join(&self, component: &str) -> AbsoluteUnixPath {
        let trimmed = component.trim_start_matches('/');
        if self.0.ends_with('/') {
            AbsoluteUnixPath(format!("{}{}", self.0, trimmed))
        } else {
            AbsoluteUnixPath(format!("{}/{}", self.0, trimmed))
        }
    }
}

impl fmt::Display for AbsoluteUnixPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AbsoluteUnixPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AbsoluteUnixPath> for String {
    fn from(path: AbsoluteUnixPath) -> Self {
        path.0
    }
}
