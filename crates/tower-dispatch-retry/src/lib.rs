//! Retrying dispatcher over a balanced pool of instances.
//!
//! The [`Dispatcher`] drives a whole operation: each attempt picks the next
//! instance from a [`RoundRobin`] balancer and executes it, retrying
//! retryable failures on subsequent instances until either the attempt
//! budget (`max_attempts`) or the wall-clock budget (`max_elapsed`) is
//! spent. An optional hard deadline abandons an attempt that is already in
//! flight.
//!
//! Which errors retry is decided by
//! [`DispatchError::is_retryable`](tower_dispatch_core::DispatchError::is_retryable):
//! rate-limiter rejections, open circuits, and transport errors are worth
//! trying on another instance; an empty pool or a passed deadline is not.
//!
//! # Examples
//!
//! ```
//! use tower_dispatch_retry::{Dispatcher, DispatcherConfig};
//! use tower_dispatch_balancer::RoundRobin;
//! use tower_dispatch_core::DispatchError;
//! use tower::service_fn;
//! use std::time::Duration;
//!
//! let balancer = RoundRobin::new(vec![
//!     service_fn(|req: String| async move {
//!         Ok::<_, DispatchError<std::io::Error>>(req.to_uppercase())
//!     }),
//! ]);
//!
//! let config = DispatcherConfig::builder()
//!     .max_attempts(3)
//!     .max_elapsed(Duration::from_millis(250))
//!     .on_retry(|attempt, delay| {
//!         println!("attempt {} failed, retrying after {:?}", attempt, delay);
//!     })
//!     .build();
//!
//! let dispatcher = Dispatcher::new(balancer, config);
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables counters via the `metrics` crate
//! - `tracing`: enables logging via the `tracing` crate

mod backoff;
mod config;
mod events;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
    NoBackoff,
};
pub use config::{DispatcherConfig, DispatcherConfigBuilder};
pub use events::DispatcherEvent;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Service, ServiceExt};
use tower_dispatch_balancer::RoundRobin;
use tower_dispatch_core::DispatchError;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A Tower [`Service`] that retries an operation across a pool of
/// interchangeable instances.
///
/// Each attempt goes to the next instance in rotation, so a retry after a
/// per-instance failure (open circuit, spent bucket, transport fault)
/// lands somewhere else.
pub struct Dispatcher<S> {
    balancer: RoundRobin<S>,
    config: Arc<DispatcherConfig>,
}

impl<S> Dispatcher<S> {
    /// Creates a dispatcher over the given balancer.
    pub fn new(balancer: RoundRobin<S>, config: DispatcherConfig) -> Self {
        Self {
            balancer,
            config: Arc::new(config),
        }
    }

    /// Returns the number of instances in the underlying pool.
    pub fn pool_size(&self) -> usize {
        self.balancer.len()
    }
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            balancer: self.balancer.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

// `Sync` on `S` is load-bearing: the returned future holds the balancer's
// shared `Arc<Vec<S>>` across `.await` points, and that `Arc` is only
// `Send` when `S` is both `Send` and `Sync`.
impl<S, Req, E> Service<Req> for Dispatcher<S>
where
    S: Service<Req, Error = DispatchError<E>> + Clone + Send + Sync + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Clone + Send + 'static,
    E: Send + 'static,
{
    type Response = S::Response;
    type Error = DispatchError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is per picked instance, driven inside each attempt.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let balancer = self.balancer.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            match config.deadline {
                Some(deadline) => {
                    let attempts = dispatch(balancer, Arc::clone(&config), req);
                    match tokio::time::timeout(deadline, attempts).await {
                        Ok(result) => result,
                        Err(_) => {
                            config.event_listeners.emit(&DispatcherEvent::Aborted {
                                component_name: config.name.clone(),
                                timestamp: Instant::now(),
                            });

                            #[cfg(feature = "tracing")]
                            tracing::warn!(dispatcher = %config.name, ?deadline, "operation abandoned at deadline");

                            #[cfg(feature = "metrics")]
                            counter!("dispatcher_calls_total", "dispatcher" => config.name.clone(), "outcome" => "aborted").increment(1);

                            Err(DispatchError::DeadlineExceeded)
                        }
                    }
                }
                None => dispatch(balancer, config, req).await,
            }
        })
    }
}

async fn dispatch<S, Req, E>(
    balancer: RoundRobin<S>,
    config: Arc<DispatcherConfig>,
    req: Req,
) -> Result<S::Response, DispatchError<E>>
where
    S: Service<Req, Error = DispatchError<E>> + Clone + Send + Sync + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Clone + Send + 'static,
    E: Send + 'static,
{
    let started = Instant::now();
    let mut attempts = 0usize;

    loop {
        let instance = match balancer.pick() {
            Ok(instance) => instance,
            Err(_) => {
                config.event_listeners.emit(&DispatcherEvent::FatalError {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                });

                #[cfg(feature = "tracing")]
                tracing::error!(dispatcher = %config.name, "no instances in pool");

                return Err(DispatchError::NoInstances);
            }
        };

        attempts += 1;

        match instance.oneshot(req.clone()).await {
            Ok(response) => {
                config.event_listeners.emit(&DispatcherEvent::Success {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempts,
                });

                #[cfg(feature = "metrics")]
                counter!("dispatcher_calls_total", "dispatcher" => config.name.clone(), "outcome" => "success").increment(1);

                return Ok(response);
            }
            Err(error) => {
                if !error.is_retryable() {
                    config.event_listeners.emit(&DispatcherEvent::FatalError {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                    });

                    #[cfg(feature = "tracing")]
                    tracing::debug!(dispatcher = %config.name, "non-retryable error surfaced");

                    return Err(error);
                }

                let delay = config
                    .interval_fn
                    .as_ref()
                    .map(|f| f.next(attempts - 1))
                    .unwrap_or(Duration::ZERO);

                // A retry only runs if both budgets still have room for it.
                if attempts >= config.max_attempts
                    || started.elapsed() + delay >= config.max_elapsed
                {
                    config.event_listeners.emit(&DispatcherEvent::Exhausted {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                        attempts,
                    });

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        dispatcher = %config.name,
                        attempts,
                        elapsed = ?started.elapsed(),
                        "retry budget exhausted"
                    );

                    #[cfg(feature = "metrics")]
                    counter!("dispatcher_calls_total", "dispatcher" => config.name.clone(), "outcome" => "exhausted").increment(1);

                    return Err(DispatchError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }

                config.event_listeners.emit(&DispatcherEvent::Retry {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempt: attempts,
                    delay,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(dispatcher = %config.name, attempt = attempts, ?delay, "retrying on next instance");

                #[cfg(feature = "metrics")]
                counter!("dispatcher_retries_total", "dispatcher" => config.name.clone()).increment(1);

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
