//! Build-to-daemon orchestration.
//!
//! One pass, no retries: precondition gate, daemon probe, configuration
//! resolution, build invocation. Every path past the gate ends by joining
//! the diagnostic drain and emitting a trailing blank line, so all output
//! is flushed before the process reports its status.

use tracing::info;

use keel_core::builder::BuildOutput;
use keel_core::{BuildEvent, DaemonProber, DockerClient, EventBus};
use keel_core::{BuildExecutor, DaemonBuild};

use crate::config::{BuildConfig, META_PACKAGING};
use crate::console::ConsoleDrain;
use crate::error::{translate, DaemonBuildError, ErrorOutcome};
use crate::resolve;
use crate::suggestions::Suggestions;

/// Terminal outcome of one invocation.
#[derive(Debug)]
pub enum BuildStatus {
    /// The gate decided there is nothing to build.
    Skipped,
    /// The image was built and loaded into the daemon.
    Built(BuildOutput),
}

/// Run a build against the real daemon client and engine.
pub async fn execute(config: BuildConfig) -> Result<BuildStatus, ErrorOutcome> {
    let client =
        DockerClient::new(config.daemon.executable.clone(), config.daemon.environment.clone());
    let mut executor = keel_core::builder::DaemonExecutor::new();
    execute_with(config, &client, &mut executor).await
}

/// Orchestration with injectable daemon probe and engine.
pub async fn execute_with(
    config: BuildConfig,
    prober: &dyn DaemonProber,
    executor: &mut dyn BuildExecutor,
) -> Result<BuildStatus, ErrorOutcome> {
    // Precondition gate: early skips bypass every later stage, including
    // the diagnostic drain.
    if config.skip {
        info!("Skipping containerization because build.skip is set");
        return Ok(BuildStatus::Skipped);
    }
    if config.packaging == META_PACKAGING {
        info!("Skipping containerization because packaging is '{}'", META_PACKAGING);
        return Ok(BuildStatus::Skipped);
    }

    let events = EventBus::new();
    let drain = ConsoleDrain::spawn(&events);

    let result = run_stages(&config, prober, executor, &events).await;

    // Runs on success and failure alike; blocks until every pending
    // diagnostic has been rendered.
    drain.finish(events).await;
    println!();

    result.map(BuildStatus::Built).map_err(translate)
}

async fn run_stages(
    config: &BuildConfig,
    prober: &dyn DaemonProber,
    executor: &mut dyn BuildExecutor,
    events: &EventBus,
) -> Result<BuildOutput, DaemonBuildError> {
    if !prober.is_reachable().await {
        return Err(DaemonBuildError::DaemonUnreachable);
    }

    let client =
        DockerClient::new(config.daemon.executable.clone(), config.daemon.environment.clone());
    let plan = resolve::resolve(config, client, events)?;
    let suggestions = Suggestions::new(plan.base.clone(), plan.base_credential_present);

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        DaemonBuildError::Configuration {
            message: format!(
                "failed to create the build output directory {}: {}",
                config.output_dir.display(),
                e
            ),
            source: Some(Box::new(e)),
        }
    })?;

    let build =
        DaemonBuild::to_docker_daemon(plan.target.clone(), config.additional_tags.clone())
            .write_image_digest(config.output_dir.join("image.digest"))
            .write_image_id(config.output_dir.join("image.id"));

    match build.run(&plan, executor, events).await {
        Ok(output) => Ok(output),
        Err(error) => {
            if !plan.base_credential_present {
                events.publish(BuildEvent::Suggestion {
                    message: suggestions.for_base_image_auth(),
                });
            }
            Err(DaemonBuildError::build_execution(error))
        }
    }
}
