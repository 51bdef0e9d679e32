use crate::events::RateLimiterEvent;
use tower_dispatch_core::{EventListeners, FnListener};

/// Configuration for the token-bucket rate limiter.
pub struct RateLimiterConfig {
    pub(crate) capacity: usize,
    pub(crate) refill_per_second: f64,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    capacity: usize,
    refill_per_second: f64,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - capacity: 100
    /// - refill_per_second: 100.0
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            capacity: 100,
            refill_per_second: 100.0,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the burst capacity of the bucket.
    ///
    /// At most `capacity` calls are admitted in a burst with no elapsed time.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the steady-state admission rate in tokens per second.
    pub fn refill_per_second(mut self, rate: f64) -> Self {
        self.refill_per_second = rate;
        self
    }

    /// Sets the name for this limiter instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a call is admitted.
    ///
    /// The callback receives the number of whole tokens remaining.
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::PermitAcquired {
                tokens_remaining, ..
            } = event
            {
                f(*tokens_remaining);
            }
        }));
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_permit_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::PermitRejected { .. } = event {
                f();
            }
        }));
        self
    }

    /// Builds the rate limiter layer.
    pub fn build(self) -> crate::RateLimiterLayer {
        let config = RateLimiterConfig {
            capacity: self.capacity,
            refill_per_second: self.refill_per_second,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        crate::RateLimiterLayer::new(config)
    }
}

#[cfg(test)]
mod tests {
    use crate::RateLimiterLayer;

    #[test]
    fn builder_defaults() {
        let _layer = RateLimiterLayer::builder().build();
    }

    #[test]
    fn builder_custom_values() {
        let _layer = RateLimiterLayer::builder()
            .capacity(10)
            .refill_per_second(2.5)
            .name("test-limiter")
            .build();
    }

    #[test]
    fn builder_event_listeners() {
        let _layer = RateLimiterLayer::builder()
            .on_permit_acquired(|_| {})
            .on_permit_rejected(|| {})
            .build();
    }
}
