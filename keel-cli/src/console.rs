//! Console rendering of build events.
//!
//! A background task drains the event bus so the engine never blocks on
//! terminal output. The orchestration joins this task on every exit path
//! so all diagnostics are flushed before the process reports its status.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use keel_core::{BuildEvent, EventBus, LogLevel};

/// Background drain for build diagnostics.
pub struct ConsoleDrain {
    handle: JoinHandle<()>,
}

impl ConsoleDrain {
    /// Subscribe to `bus` and start rendering in the background.
    pub fn spawn(bus: &EventBus) -> Self {
        let mut subscriber = bus.subscribe();
        let handle = tokio::spawn(async move {
            let mut bar: Option<ProgressBar> = None;

            while let Some(event) = subscriber.recv().await {
                match event {
                    BuildEvent::Step { index, total, description } => {
                        let bar = bar.get_or_insert_with(|| {
                            let bar = ProgressBar::new(total as u64);
                            bar.set_style(
                                ProgressStyle::default_bar()
                                    .template(
                                        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                                    )
                                    .unwrap()
                                    .progress_chars("=>-"),
                            );
                            bar
                        });
                        bar.set_position(index as u64);
                        bar.set_message(description);
                    }
                    BuildEvent::Log { level, message } => match level {
                        LogLevel::Lifecycle => println!("{}", message.bold()),
                        LogLevel::Info => println!("{}", message),
                        LogLevel::Warn => println!("{} {}", "warning:".yellow().bold(), message),
                        LogLevel::Error => eprintln!("{} {}", "error:".red().bold(), message),
                    },
                    BuildEvent::Suggestion { message } => {
                        println!("{} {}", "hint:".cyan().bold(), message);
                    }
                }
            }

            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
        });
        Self { handle }
    }

    /// Drop the final sender and block until every pending event has been
    /// rendered. No timeout: diagnostics must be complete before the
    /// process reports its final status.
    pub async fn finish(self, bus: EventBus) {
        debug!(subscribers = bus.subscriber_count(), "flushing build diagnostics");
        drop(bus);
        if let Err(e) = self.handle.await {
            warn!("diagnostic drain task failed: {}", e);
        }
    }
}
