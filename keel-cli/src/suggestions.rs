//! User-facing remediation text.
//!
//! Failure messages carry a fixed banner plus a hint specific to the
//! failure mode; the daemon-not-installed text must stay distinguishable
//! from generic configuration errors because its remediation differs.

use keel_core::ImageReference;

/// Banner prefixed to every surfaced failure.
pub const FAILURE_BANNER: &str = "Build to local daemon failed";

/// Fixed remediation for an unreachable daemon.
pub fn for_daemon_not_installed() -> String {
    "perhaps you should make sure a Docker-compatible daemon is installed and you have \
     the privileges to run it, or point daemon.executable at your client"
        .to_string()
}

/// Context-sensitive hints built from the resolved references.
#[derive(Debug, Clone)]
pub struct Suggestions {
    base_image: ImageReference,
    base_credential_present: bool,
}

impl Suggestions {
    pub fn new(base_image: ImageReference, base_credential_present: bool) -> Self {
        Self { base_image, base_credential_present }
    }

    /// Hint for base-registry auth problems; the text depends on whether
    /// credentials were configured at all.
    pub fn for_base_image_auth(&self) -> String {
        let registry = self.base_image.registry_or_default();
        if self.base_credential_present {
            format!(
                "make sure the credentials configured for {} are correct",
                registry
            )
        } else {
            format!(
                "no credentials are configured for {}; add a [registries.\"{}\"] entry to \
                 keel.toml or log in with your docker client",
                registry, registry
            )
        }
    }
}
