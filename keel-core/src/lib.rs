//! Keel core library.
//!
//! Collaborators and the build engine for containerizing a keel project
//! and exporting the image to a local container-runtime daemon.

pub mod builder;
pub mod credentials;
pub mod docker;
pub mod events;
pub mod image;
pub mod layers;
pub mod paths;
pub mod project;
pub mod unix_path;

// Re-export commonly used items
pub use builder::{BuildError, BuildExecutor, BuildOutput, BuildPlan, Containerizer, DaemonBuild};
pub use docker::{DaemonProber, DockerClient};
pub use events::{BuildEvent, EventBus, EventSubscriber, LogLevel};
pub use image::ImageReference;
pub use unix_path::AbsoluteUnixPath;
