use std::time::Instant;
use tower_dispatch_core::DispatchEvent;

/// Events emitted by the rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A token was spent and the call was admitted.
    PermitAcquired {
        /// Name of the limiter instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Whole tokens remaining after the spend.
        tokens_remaining: usize,
    },
    /// The bucket was empty and the call was rejected.
    PermitRejected {
        /// Name of the limiter instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

impl DispatchEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { component_name, .. }
            | RateLimiterEvent::PermitRejected { component_name, .. } => component_name,
        }
    }
}
