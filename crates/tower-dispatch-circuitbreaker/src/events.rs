use crate::circuit::CircuitState;
use std::time::Instant;
use tower_dispatch_core::DispatchEvent;

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved from one state to another.
    StateTransition {
        /// Name of the breaker instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State before the transition.
        from_state: CircuitState,
        /// State after the transition.
        to_state: CircuitState,
    },
    /// A call was admitted to the inner service.
    CallPermitted {
        /// Name of the breaker instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the time the call was admitted.
        state: CircuitState,
    },
    /// A call was rejected without reaching the inner service.
    CallRejected {
        /// Name of the breaker instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
    /// The inner call succeeded.
    SuccessRecorded {
        /// Name of the breaker instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the time the result was recorded.
        state: CircuitState,
    },
    /// The inner call failed.
    FailureRecorded {
        /// Name of the breaker instance.
        component_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State at the time the result was recorded.
        state: CircuitState,
        /// Consecutive failures observed so far (while closed).
        consecutive_failures: usize,
    },
}

impl DispatchEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { component_name, .. }
            | CircuitBreakerEvent::CallPermitted { component_name, .. }
            | CircuitBreakerEvent::CallRejected { component_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { component_name, .. }
            | CircuitBreakerEvent::FailureRecorded { component_name, .. } => component_name,
        }
    }
}
