//! Event bus for build diagnostics.
//!
//! The engine and the orchestration publish structured events here; the
//! frontend subscribes and renders them. Delivery is fan-out over a
//! bounded broadcast channel, so a slow renderer can lag but never blocks
//! the build.

use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Severity of a log-style event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Lifecycle,
    Info,
    Warn,
    Error,
}

/// A build diagnostic event.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// A log line attributed to the build.
    Log { level: LogLevel, message: String },
    /// Progress through the engine's build steps.
    Step { index: usize, total: usize, description: String },
    /// A remediation hint for the user.
    Suggestion { message: String },
}

impl BuildEvent {
    pub fn lifecycle(message: impl Into<String>) -> Self {
        BuildEvent::Log { level: LogLevel::Lifecycle, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        BuildEvent::Log { level: LogLevel::Info, message: message.into() }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        BuildEvent::Log { level: LogLevel::Warn, message: message.into() }
    }
}

/// Event bus for publishing and subscribing to build events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BuildEvent>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    ///
    /// Send errors (no subscribers) are ignored; diagnostics are best
    /// effort and must never fail the build.
    pub fn publish(&self, event: BuildEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe() }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of the event bus.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<BuildEvent>,
}

impl EventSubscriber {
    /// Receive the next event, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<BuildEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("event subscriber lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
