use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit is half-open and a single trial call is allowed.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Acquire {
    /// Whether the call may proceed.
    pub(crate) permitted: bool,
    /// Whether the admitted call holds the half-open trial slot.
    pub(crate) trial: bool,
}

/// Releases the half-open trial slot if the trial call never resolves.
///
/// The call future owns one of these while the trial is in flight; if the
/// future is dropped before an outcome is recorded (deadline, caller
/// cancellation), `Drop` frees the slot so the circuit is not stuck
/// rejecting every later call.
pub(crate) struct TrialGuard {
    circuit: Arc<Mutex<Circuit>>,
    armed: bool,
}

impl TrialGuard {
    pub(crate) fn new(circuit: Arc<Mutex<Circuit>>) -> Self {
        Self {
            circuit,
            armed: true,
        }
    }

    /// Disarms the guard once the trial's outcome has been recorded.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
            circuit.abandon_trial();
        }
    }
}

/// State machine tracking consecutive failures.
///
/// `Closed` counts consecutive failures and opens at the configured
/// threshold. `Open` rejects until the cooldown elapses, then the next
/// acquire becomes the half-open trial. `HalfOpen` admits exactly one
/// in-flight trial; competitors are rejected until the trial resolves.
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new_with_atomic(Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }
}

impl Circuit {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_with_atomic(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Decides whether a call may proceed, transitioning Open -> HalfOpen
    /// once the cooldown has elapsed.
    ///
    /// When `trial` is set in the result, the caller holds the single
    /// half-open trial slot and must resolve it: record an outcome, or
    /// [`abandon_trial`](Self::abandon_trial) if the call never finishes.
    pub fn try_acquire(&mut self, config: &CircuitBreakerConfig) -> Acquire {
        let acquire = match self.state {
            CircuitState::Closed => Acquire {
                permitted: true,
                trial: false,
            },
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .map(|at| at.elapsed() >= config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    self.transition_to(CircuitState::HalfOpen, config);
                    self.trial_in_flight = true;
                    Acquire {
                        permitted: true,
                        trial: true,
                    }
                } else {
                    Acquire {
                        permitted: false,
                        trial: false,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    Acquire {
                        permitted: false,
                        trial: false,
                    }
                } else {
                    self.trial_in_flight = true;
                    Acquire {
                        permitted: true,
                        trial: true,
                    }
                }
            }
        };
        let permitted = acquire.permitted;

        if permitted {
            config
                .event_listeners
                .emit(&CircuitBreakerEvent::CallPermitted {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    state: self.state,
                });
        } else {
            config
                .event_listeners
                .emit(&CircuitBreakerEvent::CallRejected {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                });

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "rejected").increment(1);
        }

        acquire
    }

    /// Releases the half-open trial slot without recording an outcome.
    ///
    /// Called when the trial's future is dropped before resolving; the
    /// circuit stays half-open and the next acquire admits a fresh trial.
    pub fn abandon_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    pub fn record_success(&mut self, config: &CircuitBreakerConfig) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                component_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "success").increment(1);

        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.transition_to(CircuitState::Closed, config);
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.transition_to(CircuitState::Open, config);
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                self.emit_failure(config);
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config);
                }
                return;
            }
            CircuitState::Open => {}
        }
        self.emit_failure(config);
    }

    fn emit_failure(&self, config: &CircuitBreakerConfig) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                component_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
                consecutive_failures: self.consecutive_failures,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "failure").increment(1);
    }

    pub fn force_open(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Open, config);
    }

    pub fn reset(&mut self, config: &CircuitBreakerConfig) {
        self.trial_in_flight = false;
        self.transition_to(CircuitState::Closed, config);
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == state {
            return;
        }

        let from_state = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                component_name: config.name.clone(),
                timestamp: Instant::now(),
                from_state,
                to_state: state,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            breaker = %config.name,
            from = from_state.as_str(),
            to = state.as_str(),
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_transitions_total",
            "circuitbreaker" => config.name.clone(),
            "from" => from_state.as_str(),
            "to" => state.as_str()
        )
        .increment(1);

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.consecutive_failures = 0;
        self.opened_at = match state {
            CircuitState::Open => Some(Instant::now()),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use std::time::Duration;
    use tower_dispatch_core::EventListeners;

    fn config(threshold: usize, cooldown: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown,
            event_listeners: EventListeners::new(),
            name: "test".into(),
        }
    }

    #[test]
    fn opens_after_exactly_threshold_consecutive_failures() {
        let mut circuit = Circuit::new();
        let config = config(3, Duration::from_secs(60));

        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);

        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[test]
    fn interleaved_success_resets_count() {
        let mut circuit = Circuit::new();
        let config = config(3, Duration::from_secs(60));

        circuit.record_failure(&config);
        circuit.record_failure(&config);
        circuit.record_success(&config);
        assert_eq!(circuit.consecutive_failures(), 0);

        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn open_rejects_until_cooldown() {
        let mut circuit = Circuit::new();
        let config = config(1, Duration::from_millis(40));

        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.try_acquire(&config).permitted);

        std::thread::sleep(Duration::from_millis(50));

        // Cooldown elapsed: exactly one trial admitted.
        assert!(circuit.try_acquire(&config).permitted);
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert!(!circuit.try_acquire(&config).permitted);
    }

    #[test]
    fn half_open_trial_success_closes() {
        let mut circuit = Circuit::new();
        let config = config(1, Duration::from_millis(10));

        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(20));
        assert!(circuit.try_acquire(&config).permitted);

        circuit.record_success(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.try_acquire(&config).permitted);
    }

    #[test]
    fn half_open_trial_failure_reopens() {
        let mut circuit = Circuit::new();
        let config = config(1, Duration::from_millis(10));

        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(20));
        assert!(circuit.try_acquire(&config).permitted);

        circuit.record_failure(&config);
        assert_eq!(circuit.state(), CircuitState::Open);
        // Fresh cooldown: rejected again immediately.
        assert!(!circuit.try_acquire(&config).permitted);
    }

    #[test]
    fn trial_resolution_frees_next_trial() {
        let mut circuit = Circuit::new();
        let config = config(1, Duration::from_millis(10));

        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(20));
        assert!(circuit.try_acquire(&config).permitted);
        circuit.record_failure(&config);

        std::thread::sleep(Duration::from_millis(20));
        assert!(circuit.try_acquire(&config).permitted);
        circuit.record_success(&config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn abandoned_trial_admits_replacement() {
        let mut circuit = Circuit::new();
        let config = config(1, Duration::from_millis(10));

        circuit.record_failure(&config);
        std::thread::sleep(Duration::from_millis(20));

        // Trial admitted but never resolves; a competitor is rejected.
        assert!(circuit.try_acquire(&config).trial);
        assert!(!circuit.try_acquire(&config).permitted);

        // Once abandoned, the slot frees up without a state change.
        circuit.abandon_trial();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        let acquire = circuit.try_acquire(&config);
        assert!(acquire.permitted && acquire.trial);
    }

    #[test]
    fn transition_events_fire() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tower_dispatch_core::FnListener;

        let transitions = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&transitions);
        let r = Arc::clone(&rejected);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |event| match event {
            CircuitBreakerEvent::StateTransition { .. } => {
                t.fetch_add(1, Ordering::SeqCst);
            }
            CircuitBreakerEvent::CallRejected { .. } => {
                r.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }));

        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(60),
            event_listeners: listeners,
            name: "test".into(),
        };

        let mut circuit = Circuit::new();
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(transitions.load(Ordering::SeqCst), 1);

        assert!(!circuit.try_acquire(&config).permitted);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }
}
