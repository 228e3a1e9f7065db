//! Failure taxonomy for the build-to-daemon flow.
//!
//! Every stage past the precondition gate signals exactly one variant of
//! `DaemonBuildError`; the translator is an exhaustive match, so adding a
//! variant without a translation row fails to compile.

use std::error::Error;
use thiserror::Error;

use keel_core::BuildError;

use crate::suggestions;

/// Closed union of every failure the orchestration can surface.
#[derive(Debug, Error)]
pub enum DaemonBuildError {
    #[error("the local container daemon is not installed or not reachable")]
    DaemonUnreachable,

    #[error("container.app_root is not an absolute Unix-style path: {value}")]
    InvalidAppRoot { value: String },

    #[error("container.working_directory is not an absolute Unix-style path: {value}")]
    InvalidWorkingDirectory { value: String },

    #[error("container.volumes entry is not an absolute Unix-style path: {value}")]
    InvalidContainerVolume { value: String },

    /// Any collaborator failure outside the named path validations:
    /// malformed references, project I/O, cache-directory creation,
    /// entry-point inference, credential retrieval.
    #[error("{message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    /// The underlying build engine failed.
    #[error("{message}")]
    BuildExecution {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl DaemonBuildError {
    /// Wrap a collaborator error, keeping its message and itself as cause.
    pub fn configuration(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Configuration { message: error.to_string(), source: Some(Box::new(error)) }
    }

    /// Wrap an engine failure, stripping the engine's outer wrapper so the
    /// recorded cause is the engine's underlying cause.
    pub fn build_execution(error: BuildError) -> Self {
        let (message, source) = error.into_parts();
        Self::BuildExecution { message, source }
    }
}

/// Exit classification for a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// The environment or an external system failed.
    Execution,
    /// The user's configuration is wrong.
    Usage,
}

impl ExitClass {
    pub fn code(self) -> i32 {
        match self {
            ExitClass::Execution => 1,
            ExitClass::Usage => 2,
        }
    }
}

/// Terminal failure: one user-facing message, the preserved cause for
/// structured logging, and the exit classification.
#[derive(Debug)]
pub struct ErrorOutcome {
    pub message: String,
    pub cause: Option<Box<dyn Error + Send + Sync>>,
    pub exit: ExitClass,
}

/// Map every failure to its user-facing outcome.
pub fn translate(error: DaemonBuildError) -> ErrorOutcome {
    match error {
        DaemonBuildError::DaemonUnreachable => ErrorOutcome {
            message: suggestions::for_daemon_not_installed(),
            cause: None,
            exit: ExitClass::Execution,
        },
        DaemonBuildError::InvalidAppRoot { ref value } => ErrorOutcome {
            message: format!("container.app_root is not an absolute Unix-style path: {}", value),
            cause: None,
            exit: ExitClass::Usage,
        },
        DaemonBuildError::InvalidWorkingDirectory { ref value } => ErrorOutcome {
            message: format!(
                "container.working_directory is not an absolute Unix-style path: {}",
                value
            ),
            cause: None,
            exit: ExitClass::Usage,
        },
        DaemonBuildError::InvalidContainerVolume { ref value } => ErrorOutcome {
            message: format!(
                "container.volumes entry is not an absolute Unix-style path: {}",
                value
            ),
            cause: None,
            exit: ExitClass::Usage,
        },
        DaemonBuildError::Configuration { message, source } => {
            ErrorOutcome { message, cause: source, exit: ExitClass::Execution }
        }
        DaemonBuildError::BuildExecution { message, source } => {
            ErrorOutcome { message, cause: source, exit: ExitClass::Execution }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_unreachable_is_execution_failure() {
        let outcome = translate(DaemonBuildError::DaemonUnreachable);
        assert_eq!(outcome.exit, ExitClass::Execution);
        assert!(outcome.message.contains("daemon"));
        assert!(outcome.cause.is_none());
    }

    #[test]
    fn test_invalid_paths_are_usage_failures() {
        for error in [
            DaemonBuildError::InvalidAppRoot { value: "relative/path".to_string() },
            DaemonBuildError::InvalidWorkingDirectory { value: "work".to_string() },
            DaemonBuildError::InvalidContainerVolume { value: "data".to_string() },
        ] {
            let offending = match &error {
                DaemonBuildError::InvalidAppRoot { value }
                | DaemonBuildError::InvalidWorkingDirectory { value }
                | DaemonBuildError::InvalidContainerVolume { value } => value.clone(),
                _ => unreachable!(),
            };
            let outcome = translate(error);
            assert_eq!(outcome.exit, ExitClass::Usage);
            assert!(outcome.message.contains(&offending));
        }
    }

    #[test]
    fn test_configuration_preserves_message_and_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let outcome = translate(DaemonBuildError::configuration(io));
        assert_eq!(outcome.exit, ExitClass::Execution);
        assert_eq!(outcome.message, "denied");
        assert!(outcome.cause.is_some());
    }

    #[test]
    fn test_build_execution_strips_outer_wrapper() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let engine = BuildError::with_source("failed to write the image archive", io);
        let outcome = translate(DaemonBuildError::build_execution(engine));
        assert_eq!(outcome.message, "failed to write the image archive");
        assert_eq!(outcome.cause.unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitClass::Execution.code(), 1);
        assert_eq!(ExitClass::Usage.code(), 2);
    }
}
