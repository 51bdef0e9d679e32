use crate::config::CircuitBreakerConfig;
use crate::CircuitBreaker;
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies circuit breaker behavior to a service.
///
/// Each wrapped service gets its own circuit; clones of that service share
/// it, so concurrent callers observe one state machine per backend
/// instance.
///
/// # Examples
///
/// ```
/// use tower::{ServiceBuilder, service_fn};
/// use tower_dispatch_circuitbreaker::CircuitBreakerLayer;
/// use std::time::Duration;
///
/// let layer = CircuitBreakerLayer::builder()
///     .failure_threshold(5)
///     .cooldown(Duration::from_secs(60))
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
/// ```
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    config: Arc<CircuitBreakerConfig>,
}

impl CircuitBreakerLayer {
    /// Creates a new `CircuitBreakerLayer` from the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder for configuring a circuit breaker layer.
    pub fn builder() -> crate::CircuitBreakerConfigBuilder {
        crate::CircuitBreakerConfigBuilder::new()
    }

    /// Wraps the given service, returning the concrete [`CircuitBreaker`].
    ///
    /// Useful when you need access to state inspection methods such as
    /// [`CircuitBreaker::state_sync`] or [`CircuitBreaker::reset`].
    pub fn layer_fn<S>(&self, service: S) -> CircuitBreaker<S> {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}
