//! Centralized host path configuration for keel.
//!
//! All host-side data paths go through this module so the CLI and the
//! engine agree on locations.

use std::path::PathBuf;

/// Get the keel data directory.
///
/// Resolution order:
/// 1. `KEEL_DATA_DIR` environment variable
/// 2. `~/.keel`
/// 3. `.keel` in the working directory when no home is available
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KEEL_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".keel")).unwrap_or_else(|| PathBuf::from(".keel"))
}

/// Get the build cache directory.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Get the directory holding the user's registry auth store.
///
/// Follows the docker CLI convention (`~/.docker/config.json`) so existing
/// logins are picked up; `DOCKER_CONFIG` overrides the location.
pub fn docker_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|h| h.join(".docker"))
}

/// Ensure the build cache directory exists, creating it if necessary.
pub fn ensure_cache_dir() -> std::io::Result<PathBuf> {
    let dir = cache_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    // KEEL_DATA_DIR is process-global, so every env-dependent assertion
    // lives in one test body.
    #[test]
    fn test_paths_follow_env_override() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("KEEL_DATA_DIR", tmp.path());

        assert_eq!(data_dir(), tmp.path());
        assert!(cache_dir().starts_with(data_dir()));

        let dir = ensure_cache_dir().unwrap();
        assert!(dir.is_dir());

        std::env::remove_var("KEEL_DATA_DIR");
    }
}
