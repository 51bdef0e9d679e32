use crate::backoff::{ExponentialBackoff, FixedInterval, IntervalFunction};
use crate::events::DispatcherEvent;
use std::sync::Arc;
use std::time::Duration;
use tower_dispatch_core::events::{EventListeners, FnListener};

/// Configuration for the dispatcher.
pub struct DispatcherConfig {
    pub(crate) max_attempts: usize,
    pub(crate) max_elapsed: Duration,
    pub(crate) deadline: Option<Duration>,
    pub(crate) interval_fn: Option<Arc<dyn IntervalFunction>>,
    pub(crate) event_listeners: EventListeners<DispatcherEvent>,
    pub(crate) name: String,
}

impl DispatcherConfig {
    /// Creates a new builder for configuring a dispatcher.
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::new()
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfigBuilder::new().build()
    }
}

/// Builder for [`DispatcherConfig`].
pub struct DispatcherConfigBuilder {
    max_attempts: usize,
    max_elapsed: Duration,
    deadline: Option<Duration>,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    event_listeners: EventListeners<DispatcherEvent>,
    name: String,
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - max_elapsed: 250ms
    /// - deadline: None
    /// - backoff: None (retry immediately)
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            max_elapsed: Duration::from_millis(250),
            deadline: None,
            interval_fn: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of attempts.
    ///
    /// This includes the initial attempt, so max_attempts=3 means
    /// 1 initial attempt + 2 retries. Must be at least 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the wall-clock budget for the whole operation.
    ///
    /// No further attempt is started once this much time has passed since
    /// the operation began; the last error is surfaced as exhaustion.
    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Sets a hard deadline for the whole operation.
    ///
    /// Unlike [`max_elapsed`](Self::max_elapsed), which only prevents new
    /// attempts from starting, the deadline abandons an attempt that is
    /// already in flight.
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

    /// Sets the name for this dispatcher (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a retry attempt is about to be made.
    ///
    /// Called with the attempt number just failed (1-indexed) and the
    /// delay before the next attempt.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatcherEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback when an operation succeeds.
    ///
    /// Called with the total number of attempts made, including the
    /// initial one.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatcherEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when the attempt or elapsed budget is spent.
    ///
    /// Called with the total number of attempts made.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatcherEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when an error is surfaced without retrying.
    pub fn on_fatal_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatcherEvent::FatalError { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback when the operation is abandoned at its deadline.
    pub fn on_aborted<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatcherEvent::Aborted { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the dispatcher configuration.
    pub fn build(self) -> DispatcherConfig {
        DispatcherConfig {
            max_attempts: self.max_attempts,
            max_elapsed: self.max_elapsed,
            deadline: self.deadline,
            interval_fn: self.interval_fn,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
