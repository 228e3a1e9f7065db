use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;
mod error;
mod resolve;
mod suggestions;

use commands::build::BuildStatus;
use config::{BuildConfig, CliOverrides, Manifest};
use error::ErrorOutcome;
use suggestions::FAILURE_BANNER;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Containerize a keel project without a Dockerfile", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the container image and load it into the local daemon
    Build {
        /// Project directory containing keel.toml
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Skip containerization entirely
        #[arg(long, env = "KEEL_SKIP")]
        skip: bool,

        /// Directory for build outputs (defaults to <project>/build)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Additional tags for the target image
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,

        /// Explicit daemon client executable
        #[arg(long, env = "KEEL_DOCKER")]
        docker_executable: Option<PathBuf>,

        /// Environment overrides for the daemon client (KEY=VALUE)
        #[arg(long = "docker-env", value_parser = parse_key_value)]
        docker_env: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { project_dir, skip, output_dir, tags, docker_executable, docker_env } => {
            let project_dir = project_dir
                .canonicalize()
                .with_context(|| format!("project directory {} not found", project_dir.display()))?;
            let manifest = Manifest::load(&project_dir)?;
            let overrides =
                CliOverrides { skip, output_dir, tags, docker_executable, docker_env };
            let config = BuildConfig::assemble(project_dir, manifest, overrides);

            match commands::build::execute(config).await {
                Ok(BuildStatus::Skipped) | Ok(BuildStatus::Built(_)) => Ok(()),
                Err(outcome) => {
                    report_failure(&outcome);
                    std::process::exit(outcome.exit.code());
                }
            }
        }
    }
}

/// Print the single user-facing failure message and its cause chain.
fn report_failure(outcome: &ErrorOutcome) {
    eprintln!("{}: {}", FAILURE_BANNER.red().bold(), outcome.message);

    if let Some(root) = outcome.cause.as_deref() {
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(root);
        while let Some(error) = cause {
            eprintln!("  {} {}", "caused by:".dimmed(), error);
            cause = error.source();
        }
    }
}
