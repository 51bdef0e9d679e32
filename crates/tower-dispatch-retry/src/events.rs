use std::time::{Duration, Instant};
use tower_dispatch_core::events::DispatchEvent;

/// Events emitted by the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatcherEvent {
    /// A retry attempt is about to be made against the next instance.
    Retry {
        component_name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded (either on first try or after retries).
    Success {
        component_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The operation failed with the attempt or elapsed budget spent.
    Exhausted {
        component_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// An error occurred that is not retryable and was surfaced directly.
    FatalError {
        component_name: String,
        timestamp: Instant,
    },
    /// The operation was abandoned because its deadline passed.
    Aborted {
        component_name: String,
        timestamp: Instant,
    },
}

impl DispatchEvent for DispatcherEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DispatcherEvent::Retry { .. } => "retry",
            DispatcherEvent::Success { .. } => "success",
            DispatcherEvent::Exhausted { .. } => "exhausted",
            DispatcherEvent::FatalError { .. } => "fatal_error",
            DispatcherEvent::Aborted { .. } => "aborted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            DispatcherEvent::Retry { timestamp, .. }
            | DispatcherEvent::Success { timestamp, .. }
            | DispatcherEvent::Exhausted { timestamp, .. }
            | DispatcherEvent::FatalError { timestamp, .. }
            | DispatcherEvent::Aborted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            DispatcherEvent::Retry { component_name, .. }
            | DispatcherEvent::Success { component_name, .. }
            | DispatcherEvent::Exhausted { component_name, .. }
            | DispatcherEvent::FatalError { component_name, .. }
            | DispatcherEvent::Aborted { component_name, .. } => component_name,
        }
    }
}
