use std::time::Duration;

/// Computes the delay before a given retry attempt.
///
/// `attempt` is zero-indexed: the delay before the first retry is
/// `next(0)`, before the second retry `next(1)`, and so on.
pub trait IntervalFunction: Send + Sync {
    /// Returns the delay to wait before the given retry attempt.
    fn next(&self, attempt: usize) -> Duration;
}

impl<T: IntervalFunction + ?Sized> IntervalFunction for std::sync::Arc<T> {
    fn next(&self, attempt: usize) -> Duration {
        (**self).next(attempt)
    }
}

/// No delay at all: every retry fires immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl IntervalFunction for NoBackoff {
    fn next(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// A constant delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    /// Creates a fixed interval with the given delay.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IntervalFunction for FixedInterval {
    fn next(&self, _attempt: usize) -> Duration {
        self.interval
    }
}

/// Exponentially growing delay: `initial * multiplier^attempt`.
///
/// With the default multiplier of 2.0 and a 100ms initial interval, the
/// sequence is 100ms, 200ms, 400ms, ...
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff with a multiplier of 2.0.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
        }
    }

    /// Creates an exponential backoff with a custom multiplier.
    pub fn with_multiplier(initial_interval: Duration, multiplier: f64) -> Self {
        Self {
            initial_interval,
            multiplier,
        }
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.initial_interval.mul_f64(factor)
    }
}

/// Exponential backoff with random jitter.
///
/// Each delay is drawn uniformly from
/// `[base * (1 - randomization_factor), base * (1 + randomization_factor)]`
/// where `base` is the exponential delay for that attempt. Jitter spreads
/// out retries from callers that failed at the same moment.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialRandomBackoff {
    backoff: ExponentialBackoff,
    randomization_factor: f64,
}

impl ExponentialRandomBackoff {
    /// Creates a randomized exponential backoff with a randomization
    /// factor of 0.5.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(initial_interval),
            randomization_factor: 0.5,
        }
    }

    /// Sets the randomization factor, clamped to `[0.0, 1.0]`.
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next(&self, attempt: usize) -> Duration {
        let base = self.backoff.next(attempt);
        if self.randomization_factor == 0.0 {
            return base;
        }
        let low = base.mul_f64(1.0 - self.randomization_factor);
        let high = base.mul_f64(1.0 + self.randomization_factor);
        let jittered = rand::random_range(low.as_secs_f64()..=high.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

/// A custom function-based interval.
pub struct FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Creates an interval function from a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}
