//! Consecutive-failure circuit breaker for Tower services.
//!
//! The breaker tracks consecutive failures of the wrapped service and
//! short-circuits calls once a threshold is crossed, probing for recovery
//! after a cooldown.
//!
//! ## States
//! - **Closed**: calls pass through; each failure increments a consecutive
//!   counter, any success resets it to zero
//! - **Open**: calls are rejected immediately without invoking the inner
//!   service; after the cooldown the circuit half-opens
//! - **Half-Open**: exactly one trial call is admitted; success closes the
//!   circuit, failure re-opens it with a fresh cooldown
//!
//! # Examples
//!
//! ```
//! use tower_dispatch_circuitbreaker::{CircuitBreakerLayer, CircuitBreakerError};
//! use tower::{Service, ServiceBuilder, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::builder()
//!     .failure_threshold(5)
//!     .cooldown(Duration::from_secs(30))
//!     .on_state_transition(|from, to| {
//!         println!("circuit: {:?} -> {:?}", from, to);
//!     })
//!     .build();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|req: String| async move { Ok::<_, ()>(req) }));
//!
//! match service.call("request".to_string()).await {
//!     Ok(response) => println!("success: {}", response),
//!     Err(CircuitBreakerError::OpenCircuit) => eprintln!("circuit is open"),
//!     Err(CircuitBreakerError::Inner(e)) => eprintln!("service error: {:?}", e),
//! }
//! # }
//! ```
//!
//! ## State Inspection
//!
//! ```
//! use tower_dispatch_circuitbreaker::{CircuitBreakerLayer, CircuitState};
//! use tower::service_fn;
//!
//! let layer = CircuitBreakerLayer::builder().build();
//! let svc = service_fn(|req: String| async move { Ok::<String, ()>(req) });
//! let breaker = layer.layer_fn(svc);
//!
//! // Lock-free, callable from sync code.
//! assert_eq!(breaker.state_sync(), CircuitState::Closed);
//! assert!(!breaker.is_open());
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables counters via the `metrics` crate
//! - `tracing`: enables logging via the `tracing` crate

use futures::future::BoxFuture;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

pub use circuit::CircuitState;
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;

use crate::circuit::{Circuit, TrialGuard};

mod circuit;
mod config;
mod error;
mod events;
mod layer;

/// A Tower Service that applies circuit breaker logic to an inner service.
///
/// The circuit is consulted before each call and updated after it; the
/// circuit's lock is only ever held for that bookkeeping, never across the
/// inner call itself.
pub struct CircuitBreaker<S> {
    inner: S,
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig>,
}

impl<S> CircuitBreaker<S> {
    /// Creates a new `CircuitBreaker` wrapping the given service.
    pub(crate) fn new(inner: S, config: Arc<CircuitBreakerConfig>) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            inner,
            circuit: Arc::new(Mutex::new(Circuit::new_with_atomic(Arc::clone(
                &state_atomic,
            )))),
            state_atomic,
            config,
        }
    }

    /// Returns the current state of the circuit without locking.
    ///
    /// Safe to call from sync code (health checks, metrics collection).
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state_sync() == CircuitState::Open
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.force_open(&self.config);
    }

    /// Resets the circuit to the closed state and clears the failure count.
    pub fn reset(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.reset(&self.config);
    }
}

impl<S> Clone for CircuitBreaker<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            circuit: Arc::clone(&self.circuit),
            state_atomic: Arc::clone(&self.state_atomic),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req> Service<Req> for CircuitBreaker<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let config = Arc::clone(&self.config);
        let circuit = Arc::clone(&self.circuit);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let acquire = {
                let mut circuit = circuit.lock().unwrap_or_else(|e| e.into_inner());
                circuit.try_acquire(&config)
            };

            if !acquire.permitted {
                #[cfg(feature = "tracing")]
                tracing::debug!(breaker = %config.name, "circuit open, call rejected");

                return Err(CircuitBreakerError::OpenCircuit);
            }

            // Holding the trial slot obliges us to resolve it even if this
            // future is dropped mid-call.
            let mut trial_guard = if acquire.trial {
                Some(TrialGuard::new(Arc::clone(&circuit)))
            } else {
                None
            };

            let result = inner.call(req).await;

            let mut circuit = circuit.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(guard) = trial_guard.as_mut() {
                guard.disarm();
            }
            match &result {
                Ok(_) => circuit.record_success(&config),
                Err(_) => circuit.record_failure(&config),
            }

            result.map_err(CircuitBreakerError::Inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, Layer, ServiceExt};

    fn failing_service(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<String, Response = String, Error = String, Future: Send> + Clone + Send {
        service_fn(move |_req: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("backend down".to_string())
            }
        })
    }

    #[tokio::test]
    async fn opens_after_threshold_and_stops_forwarding() {
        let calls = Arc::new(AtomicUsize::new(0));

        let layer = CircuitBreakerLayer::builder()
            .failure_threshold(3)
            .cooldown(Duration::from_secs(60))
            .build();
        let mut service = layer.layer(failing_service(Arc::clone(&calls)));

        for _ in 0..3 {
            let result = service.ready().await.unwrap().call("x".to_string()).await;
            assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
        }

        // Circuit now open: inner never invoked again.
        for _ in 0..5 {
            let result = service.ready().await.unwrap().call("x".to_string()).await;
            assert!(matches!(result, Err(CircuitBreakerError::OpenCircuit)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_through_half_open_trial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&calls);

        // Fails twice, then succeeds.
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("down".to_string())
                } else {
                    Ok("up".to_string())
                }
            }
        });

        let layer = CircuitBreakerLayer::builder()
            .failure_threshold(2)
            .cooldown(Duration::from_millis(30))
            .build();
        let mut service = layer.layer(service);

        for _ in 0..2 {
            let _ = service.ready().await.unwrap().call("x".to_string()).await;
        }
        assert!(matches!(
            service.ready().await.unwrap().call("x".to_string()).await,
            Err(CircuitBreakerError::OpenCircuit)
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;

        // Half-open trial succeeds and closes the circuit.
        let result = service.ready().await.unwrap().call("x".to_string()).await;
        assert_eq!(result.unwrap(), "up");

        let result = service.ready().await.unwrap().call("x".to_string()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn abandoned_trial_does_not_wedge_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&calls);

        // Fails once, then answers slowly, then answers fast.
        let service = service_fn(move |_req: String| {
            let cc = Arc::clone(&cc);
            async move {
                match cc.fetch_add(1, Ordering::SeqCst) {
                    0 => Err("down".to_string()),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok("slow".to_string())
                    }
                    _ => Ok("up".to_string()),
                }
            }
        });

        let layer = CircuitBreakerLayer::builder()
            .failure_threshold(1)
            .cooldown(Duration::from_millis(20))
            .build();
        let mut service = layer.layer(service);

        let _ = service.ready().await.unwrap().call("x".to_string()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The half-open trial is dropped mid-call, as a caller deadline
        // would do.
        let trial = tokio::time::timeout(
            Duration::from_millis(30),
            service.ready().await.unwrap().call("x".to_string()),
        );
        assert!(trial.await.is_err());

        // The dropped trial must not leave the circuit rejecting forever:
        // the next call is admitted as a fresh trial and closes the circuit.
        let result = service.ready().await.unwrap().call("x".to_string()).await;
        assert_eq!(result.unwrap(), "up");
    }

    #[tokio::test]
    async fn state_inspection() {
        let layer = CircuitBreakerLayer::builder().failure_threshold(1).build();
        let breaker = layer.layer_fn(service_fn(|req: String| async move {
            Ok::<String, String>(req)
        }));

        assert_eq!(breaker.state_sync(), CircuitState::Closed);
        assert!(!breaker.is_open());

        breaker.force_open();
        assert!(breaker.is_open());

        breaker.reset();
        assert_eq!(breaker.state_sync(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn success_keeps_circuit_closed() {
        let layer = CircuitBreakerLayer::builder().failure_threshold(1).build();
        let mut service = layer.layer(service_fn(|req: String| async move {
            Ok::<String, String>(req)
        }));

        for _ in 0..10 {
            assert!(service
                .ready()
                .await
                .unwrap()
                .call("x".to_string())
                .await
                .is_ok());
        }
    }
}
