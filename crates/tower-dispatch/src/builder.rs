use crate::endpoint::{endpoint, Endpoint};
use crate::proxy::{DispatchProxy, ProxyAdapter};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};
use tower_dispatch_balancer::RoundRobin;
use tower_dispatch_circuitbreaker::{CircuitBreakerError, CircuitBreakerLayer};
use tower_dispatch_core::DispatchError;
use tower_dispatch_ratelimiter::{RateLimiterError, RateLimiterLayer};
use tower_dispatch_retry::{
    Dispatcher, DispatcherConfig, ExponentialBackoff, FixedInterval, IntervalFunction,
};

/// Collapses the nested per-instance stack error into [`DispatchError`].
///
/// The stack is breaker over limiter over transport, so the error nesting
/// it produces is `CircuitBreakerError<RateLimiterError<E>>`.
fn collapse<E>(err: CircuitBreakerError<RateLimiterError<E>>) -> DispatchError<E> {
    match err {
        CircuitBreakerError::OpenCircuit => DispatchError::CircuitOpen { name: None },
        CircuitBreakerError::Inner(RateLimiterError::RateLimited { retry_after }) => {
            DispatchError::RateLimited { retry_after }
        }
        CircuitBreakerError::Inner(RateLimiterError::Inner(e)) => DispatchError::Transport(e),
    }
}

/// Construction-time configuration for a full dispatch stack.
///
/// One builder wires everything: each instance service gets its own
/// circuit breaker and token bucket (breaker outermost, so an open
/// circuit costs no tokens), the wrapped instances are pooled behind a
/// round-robin balancer, and a retrying [`Dispatcher`] drives the whole
/// operation.
///
/// # Examples
///
/// ```
/// use tower_dispatch::DispatchBuilder;
/// use tower::service_fn;
/// use std::time::Duration;
///
/// let instances = vec![
///     service_fn(|req: String| async move { Ok::<_, std::io::Error>(req.to_uppercase()) }),
/// ];
///
/// let dispatcher = DispatchBuilder::new()
///     .rate_capacity(100)
///     .refill_per_second(100.0)
///     .failure_threshold(5)
///     .cooldown(Duration::from_secs(60))
///     .max_attempts(3)
///     .max_elapsed(Duration::from_millis(250))
///     .name("uppercase")
///     .dispatcher(instances);
/// ```
pub struct DispatchBuilder {
    rate_capacity: usize,
    refill_per_second: f64,
    failure_threshold: usize,
    cooldown: Duration,
    max_attempts: usize,
    max_elapsed: Duration,
    deadline: Option<Duration>,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    name: String,
}

impl Default for DispatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchBuilder {
    /// Creates a builder with defaults.
    ///
    /// Defaults:
    /// - rate_capacity: 100 tokens, refill_per_second: 100.0
    /// - failure_threshold: 5, cooldown: 60s
    /// - max_attempts: 3, max_elapsed: 250ms
    /// - deadline: None, backoff: None (retry immediately)
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            rate_capacity: 100,
            refill_per_second: 100.0,
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            max_attempts: 3,
            max_elapsed: Duration::from_millis(250),
            deadline: None,
            interval_fn: None,
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the per-instance token bucket capacity.
    pub fn rate_capacity(mut self, capacity: usize) -> Self {
        self.rate_capacity = capacity;
        self
    }

    /// Sets the per-instance token refill rate, in tokens per second.
    pub fn refill_per_second(mut self, rate: f64) -> Self {
        self.refill_per_second = rate;
        self
    }

    /// Sets the consecutive-failure count that opens an instance's circuit.
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets how long an open circuit waits before admitting a trial call.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the maximum number of attempts per operation.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the wall-clock budget per operation.
    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Sets a hard deadline that abandons an in-flight attempt.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a fixed backoff interval between attempts.
    pub fn fixed_backoff(mut self, duration: Duration) -> Self {
        self.interval_fn = Some(Arc::new(FixedInterval::new(duration)));
        self
    }

    /// Sets exponential backoff with default settings.
    pub fn exponential_backoff(mut self, initial_interval: Duration) -> Self {
        self.interval_fn = Some(Arc::new(ExponentialBackoff::new(initial_interval)));
        self
    }

    /// Sets a custom interval function for backoff.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval_fn));
        self
    }

    /// Sets the name used by every component in the stack (events, logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Builds a retrying dispatcher over the given instance services.
    ///
    /// Each instance is wrapped with its own circuit breaker and token
    /// bucket, its stack error collapsed into [`DispatchError`] and boxed
    /// into an [`Endpoint`].
    pub fn dispatcher<S, Req, E>(&self, instances: Vec<S>) -> Dispatcher<Endpoint<Req, S::Response, E>>
    where
        S: Service<Req, Error = E> + Clone + Send + Sync + 'static,
        S::Response: Send + 'static,
        S::Future: Send + 'static,
        Req: Send + 'static,
        E: Send + 'static,
    {
        let limiter = RateLimiterLayer::builder()
            .capacity(self.rate_capacity)
            .refill_per_second(self.refill_per_second)
            .name(self.name.clone())
            .build();
        let breaker = CircuitBreakerLayer::builder()
            .failure_threshold(self.failure_threshold)
            .cooldown(self.cooldown)
            .name(self.name.clone())
            .build();

        let endpoints: Vec<Endpoint<Req, S::Response, E>> = instances
            .into_iter()
            .map(|instance| {
                let stack = breaker.layer(limiter.layer(instance));
                endpoint(stack.map_err(|err| collapse(err)))
            })
            .collect();

        let mut config = DispatcherConfig::builder()
            .max_attempts(self.max_attempts)
            .max_elapsed(self.max_elapsed)
            .name(self.name.clone());
        if let Some(deadline) = self.deadline {
            config = config.deadline(deadline);
        }
        if let Some(interval_fn) = &self.interval_fn {
            config = config.backoff(Arc::clone(interval_fn));
        }

        Dispatcher::new(RoundRobin::new(endpoints), config.build())
    }

    /// Builds a proxy over the given instances, or falls back to `local`.
    ///
    /// With at least one instance the returned proxy engages the full
    /// stack through a [`ProxyAdapter`]; with zero instances every call
    /// goes straight to `local`, untouched by balancer, breaker, limiter,
    /// or retry.
    pub fn proxy<S, Req, E, Enc, Dec, L>(
        &self,
        instances: Vec<S>,
        encode: Enc,
        decode: Dec,
        local: L,
    ) -> DispatchProxy<ProxyAdapter<Dispatcher<Endpoint<Req, S::Response, E>>, Enc, Dec>, L>
    where
        S: Service<Req, Error = E> + Clone + Send + Sync + 'static,
        S::Response: Send + 'static,
        S::Future: Send + 'static,
        Req: Send + 'static,
        E: Send + 'static,
    {
        if instances.is_empty() {
            DispatchProxy::Local(local)
        } else {
            DispatchProxy::Remote(ProxyAdapter::new(
                self.dispatcher(instances),
                encode,
                decode,
            ))
        }
    }
}
