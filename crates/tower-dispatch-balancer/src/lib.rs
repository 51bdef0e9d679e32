//! Fixed instance pool and round-robin selection for Tower services.
//!
//! A [`RoundRobin`] balancer owns an ordered, fixed set of interchangeable
//! services (one per backend instance, typically each already wrapped with
//! its own resilience layers) and hands out clones in cyclic order. The
//! pool's membership never changes after construction; dynamic discovery
//! is an external concern.
//!
//! # Examples
//!
//! ```
//! use tower_dispatch_balancer::RoundRobin;
//! use tower::service_fn;
//!
//! let instance = |name: &'static str| {
//!     service_fn(move |req: String| async move { Ok::<_, ()>(format!("{name}: {req}")) })
//! };
//! let balancer = RoundRobin::new(vec![instance("a"), instance("b")]);
//!
//! let first = balancer.pick().unwrap();
//! let second = balancer.pick().unwrap();
//! ```

mod error;

pub use error::BalancerError;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A round-robin balancer over a fixed pool of services.
///
/// `pick()` returns pool elements in cyclic order across successive calls.
/// The cursor increment is a single atomic `fetch_add`, so concurrent
/// pickers never skip or duplicate an index under contention; the only
/// fairness wobble is the modulo discontinuity when the cursor wraps
/// around `usize::MAX`.
///
/// Cloning the balancer shares the pool and the cursor.
#[derive(Debug)]
pub struct RoundRobin<S> {
    pool: Arc<Vec<S>>,
    cursor: Arc<AtomicUsize>,
}

impl<S> Clone for RoundRobin<S> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            cursor: Arc::clone(&self.cursor),
        }
    }
}

impl<S> RoundRobin<S> {
    /// Creates a balancer over the given ordered pool.
    pub fn new(pool: Vec<S>) -> Self {
        Self {
            pool: Arc::new(pool),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of instances in the pool.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Returns true if the pool holds no instances.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl<S: Clone> RoundRobin<S> {
    /// Selects the next service in rotation.
    ///
    /// Fails with [`BalancerError::NoInstances`] if the pool is empty.
    /// The returned clone shares state with its pool entry (buckets,
    /// circuits), so executing it observes the instance's real condition.
    pub fn pick(&self) -> Result<S, BalancerError> {
        if self.pool.is_empty() {
            return Err(BalancerError::NoInstances);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        Ok(self.pool[idx].clone())
    }
}
