use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Internal token-bucket state.
///
/// Tokens accumulate at `refill_per_second` up to `capacity` and one token
/// is spent per admitted call. Invariant: `0.0 <= tokens <= capacity`.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// Maximum number of tokens the bucket can hold.
    capacity: usize,
    /// Currently available tokens.
    tokens: f64,
    /// Tokens added per elapsed second.
    refill_per_second: f64,
    /// When the bucket was last refilled.
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(capacity: usize, refill_per_second: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Attempts to spend one token, refilling first.
    ///
    /// Refill-check-spend is a single step under the caller's lock.
    /// Returns `Err(wait)` with the time until one token accrues when the
    /// bucket is empty; no token is consumed on rejection.
    pub(crate) fn try_acquire(&mut self) -> Result<(), Option<Duration>> {
        self.refill(Instant::now());

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        if self.refill_per_second > 0.0 {
            let deficit = 1.0 - self.tokens;
            Err(Some(Duration::from_secs_f64(deficit / self.refill_per_second)))
        } else {
            Err(None)
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Returns the currently available whole tokens.
    pub(crate) fn available(&self) -> usize {
        self.tokens as usize
    }
}

/// Shared token bucket that can be cloned across service clones.
#[derive(Debug, Clone)]
pub(crate) struct SharedTokenBucket {
    state: Arc<Mutex<TokenBucket>>,
}

impl SharedTokenBucket {
    pub(crate) fn new(capacity: usize, refill_per_second: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenBucket::new(capacity, refill_per_second))),
        }
    }

    /// Attempts to acquire a token. Rejection is immediate, never queued.
    pub(crate) fn try_acquire(&self) -> Result<(), Option<Duration>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.try_acquire()
    }

    /// Returns the currently available whole tokens.
    pub(crate) fn available(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.available()
    }
}
