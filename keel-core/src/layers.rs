//! Layer configuration for image assembly.
//!
//! A layer is an ordered list of host files mapped to container paths with
//! explicit permissions. Layers are discovered by project analysis and
//! consumed verbatim by the engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::unix_path::AbsoluteUnixPath;

/// Error type for permission parsing.
#[derive(Debug, Error)]
#[error("invalid octal permission string '{value}' for {path}")]
pub struct PermissionError {
    pub path: String,
    pub value: String,
}

/// Unix permission bits for a container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissions(pub u32);

impl FilePermissions {
    /// Default permissions for regular files.
    pub const DEFAULT_FILE: FilePermissions = FilePermissions(0o644);

    /// Default permissions for directories and executables.
    pub const DEFAULT_EXECUTABLE: FilePermissions = FilePermissions(0o755);

    /// Parse an octal string such as "644" or "0755".
    pub fn parse_octal(path: &str, value: &str) -> Result<Self, PermissionError> {
        let bits = u32::from_str_radix(value, 8).map_err(|_| PermissionError {
            path: path.to_string(),
            value: value.to_string(),
        })?;
        if bits > 0o777 {
            return Err(PermissionError { path: path.to_string(), value: value.to_string() });
        }
        Ok(Self(bits))
    }

    pub fn mode(&self) -> u32 {
        self.0
    }
}

/// One host file or directory mapped into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEntry {
    /// Source on the host filesystem.
    pub source: PathBuf,
    /// Destination inside the container.
    pub target: AbsoluteUnixPath,
    /// Permissions applied to the destination.
    pub permissions: FilePermissions,
}

/// A named, ordered set of entries forming one image layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfiguration {
    /// Layer name used in diagnostics (e.g., "dependencies").
    pub name: String,
    pub entries: Vec<LayerEntry>,
}

impl LayerConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: Vec::new() }
    }

    pub fn add_entry(
        &mut self,
        source: PathBuf,
        target: AbsoluteUnixPath,
        permissions: FilePermissions,
    ) {
        self.entries.push(LayerEntry { source, target, permissions });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
