use crate::{RateLimiter, RateLimiterConfig};
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies token-bucket rate limiting to a service.
///
/// Each wrapped service gets its own bucket; clones of that service share
/// the bucket.
///
/// # Examples
///
/// ```
/// use tower_dispatch_ratelimiter::RateLimiterLayer;
/// use tower::ServiceBuilder;
///
/// # async fn example() {
/// let rate_limiter = RateLimiterLayer::builder()
///     .capacity(100)
///     .refill_per_second(100.0)
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(rate_limiter)
///     .service(my_service());
/// # }
/// # fn my_service() -> impl tower::Service<String, Response = String, Error = std::io::Error> {
/// #     tower::service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) })
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiterLayer {
    config: Arc<RateLimiterConfig>,
}

impl RateLimiterLayer {
    /// Creates a new `RateLimiterLayer` with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder for configuring a rate limiter layer.
    pub fn builder() -> crate::RateLimiterConfigBuilder {
        crate::RateLimiterConfigBuilder::new()
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiter<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimiter::new(service, Arc::clone(&self.config))
    }
}
