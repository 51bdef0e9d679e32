//! Token-bucket rate limiting middleware for Tower services.
//!
//! Wraps a service and rejects calls once the instantaneous rate exceeds
//! the configured budget. Tokens accrue at a fixed rate up to a burst
//! capacity and each admitted call spends one token. Rejection is
//! synchronous and immediate: the limiter never queues or sleeps, so an
//! outer retry layer can redirect the call to another instance instead.
//!
//! # Examples
//!
//! ```
//! use tower_dispatch_ratelimiter::RateLimiterLayer;
//! use tower::ServiceBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Allow bursts of 100 and a steady 100 calls per second.
//! let rate_limiter = RateLimiterLayer::builder()
//!     .capacity(100)
//!     .refill_per_second(100.0)
//!     .on_permit_rejected(|| {
//!         println!("rate limited");
//!     })
//!     .build();
//!
//! let service = ServiceBuilder::new()
//!     .layer(rate_limiter)
//!     .service(tower::service_fn(|req: String| async move {
//!         Ok::<_, std::io::Error>(format!("response: {}", req))
//!     }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables counters via the `metrics` crate
//! - `tracing`: enables logging via the `tracing` crate

mod bucket;
mod config;
mod error;
mod events;
mod layer;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;
pub use layer::RateLimiterLayer;

use crate::bucket::SharedTokenBucket;
use futures::future::BoxFuture;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

/// A Tower [`Service`] that applies token-bucket rate limiting.
///
/// The bucket is shared across clones of the service, so concurrent
/// callers draw from one budget. Refill-check-spend happens as a single
/// step under the bucket's lock; the lock is never held across the inner
/// call.
pub struct RateLimiter<S> {
    inner: S,
    config: Arc<RateLimiterConfig>,
    bucket: SharedTokenBucket,
}

impl<S> RateLimiter<S> {
    /// Creates a new `RateLimiter` wrapping the given service.
    pub fn new(inner: S, config: Arc<RateLimiterConfig>) -> Self {
        let bucket = SharedTokenBucket::new(config.capacity, config.refill_per_second);

        Self {
            inner,
            config,
            bucket,
        }
    }
}

impl<S> Clone for RateLimiter<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            bucket: self.bucket.clone(),
        }
    }
}

impl<S, Req> Service<Req> for RateLimiter<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = RateLimiterError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RateLimiterError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let bucket = self.bucket.clone();
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match bucket.try_acquire() {
                Ok(()) => {
                    let event = RateLimiterEvent::PermitAcquired {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                        tokens_remaining: bucket.available(),
                    };
                    config.event_listeners.emit(&event);

                    #[cfg(feature = "metrics")]
                    counter!("ratelimiter_calls_total", "ratelimiter" => config.name.clone(), "outcome" => "permitted").increment(1);

                    #[cfg(feature = "tracing")]
                    tracing::trace!(limiter = %config.name, "token spent, call permitted");

                    inner.call(req).await.map_err(RateLimiterError::Inner)
                }
                Err(retry_after) => {
                    let event = RateLimiterEvent::PermitRejected {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                    };
                    config.event_listeners.emit(&event);

                    #[cfg(feature = "metrics")]
                    counter!("ratelimiter_calls_total", "ratelimiter" => config.name.clone(), "outcome" => "rejected").increment(1);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(limiter = %config.name, "bucket empty, call rejected");

                    Err(RateLimiterError::RateLimited { retry_after })
                }
            }
        })
    }
}
