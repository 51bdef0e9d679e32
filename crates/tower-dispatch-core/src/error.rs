//! The unified error type for a dispatch stack.
//!
//! Every per-instance endpoint in a dispatch pool fails with
//! [`DispatchError<E>`], where `E` is the transport error of the underlying
//! call. The retrying dispatcher classifies these errors: limiter and
//! breaker rejections and transport failures are retried against another
//! instance, while an empty pool or an expired deadline is fatal to the
//! whole call.
//!
//! # Examples
//!
//! ```
//! use tower_dispatch_core::DispatchError;
//!
//! let err: DispatchError<std::io::Error> = DispatchError::RateLimited { retry_after: None };
//! assert!(err.is_retryable());
//!
//! let fatal: DispatchError<std::io::Error> = DispatchError::DeadlineExceeded;
//! assert!(!fatal.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

/// The error type produced by a dispatch stack.
///
/// # Type Parameters
///
/// - `E`: The transport error type of the underlying per-instance call
#[derive(Debug)]
pub enum DispatchError<E> {
    /// The per-instance rate limiter rejected the call locally; no network
    /// attempt was made.
    RateLimited {
        /// How long until a token is expected to be available, if known.
        retry_after: Option<Duration>,
    },

    /// The per-instance circuit breaker rejected the call locally.
    CircuitOpen {
        /// Breaker name, if one was configured.
        name: Option<String>,
    },

    /// The instance pool is empty.
    NoInstances,

    /// The underlying transport call failed or returned malformed data.
    Transport(E),

    /// The retry budget (attempt count or elapsed time) was consumed.
    /// Wraps the most recent underlying error.
    RetriesExhausted {
        /// Number of attempts issued before giving up.
        attempts: usize,
        /// The last error observed before the budget ran out.
        last: Box<DispatchError<E>>,
    },

    /// The externally supplied deadline fired mid-dispatch.
    DeadlineExceeded,
}

// Display is written by hand: a derive formatting `last` would demand
// `Box<DispatchError<E>>: Display` on its own impl, which the trait
// solver cannot discharge.
impl<E: fmt::Display> fmt::Display for DispatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::RateLimited { .. } => f.write_str("rate limited"),
            DispatchError::CircuitOpen { name } => {
                write!(
                    f,
                    "circuit breaker {} is open",
                    name.as_deref().unwrap_or("<unnamed>")
                )
            }
            DispatchError::NoInstances => f.write_str("no instances available"),
            DispatchError::Transport(e) => write!(f, "transport failure: {e}"),
            DispatchError::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {attempts} attempts: {last}")
            }
            DispatchError::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for DispatchError<E> {}

impl<E> DispatchError<E> {
    /// Returns `true` if the dispatcher may retry this error against
    /// another instance.
    ///
    /// Limiter and breaker rejections and transport failures are local,
    /// transient conditions; everything else is fatal to the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::RateLimited { .. }
                | DispatchError::CircuitOpen { .. }
                | DispatchError::Transport(_)
        )
    }

    /// Returns `true` if this is a local rate-limiter rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DispatchError::RateLimited { .. })
    }

    /// Returns `true` if this is a local circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DispatchError::CircuitOpen { .. })
    }

    /// Returns `true` if the retry budget was consumed.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, DispatchError::RetriesExhausted { .. })
    }

    /// Returns `true` if the external deadline fired.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, DispatchError::DeadlineExceeded)
    }

    /// Extracts the transport error, if this is a `Transport` variant.
    pub fn transport_error(self) -> Option<E> {
        match self {
            DispatchError::Transport(e) => Some(e),
            _ => None,
        }
    }

    /// Unwraps `RetriesExhausted` down to the last underlying error,
    /// returning any other variant unchanged.
    pub fn into_cause(self) -> DispatchError<E> {
        match self {
            DispatchError::RetriesExhausted { last, .. } => last.into_cause(),
            other => other,
        }
    }

    /// Maps the transport error using a function.
    ///
    /// # Examples
    ///
    /// ```
    /// use tower_dispatch_core::DispatchError;
    ///
    /// let err: DispatchError<String> = DispatchError::Transport("boom".to_string());
    /// let mapped: DispatchError<usize> = err.map_transport(|s| s.len());
    /// assert_eq!(mapped.transport_error(), Some(4));
    /// ```
    pub fn map_transport<F, T>(self, f: F) -> DispatchError<T>
    where
        F: FnOnce(E) -> T + Copy,
    {
        match self {
            DispatchError::RateLimited { retry_after } => DispatchError::RateLimited { retry_after },
            DispatchError::CircuitOpen { name } => DispatchError::CircuitOpen { name },
            DispatchError::NoInstances => DispatchError::NoInstances,
            DispatchError::Transport(e) => DispatchError::Transport(f(e)),
            DispatchError::RetriesExhausted { attempts, last } => DispatchError::RetriesExhausted {
                attempts,
                last: Box::new(last.map_transport(f)),
            },
            DispatchError::DeadlineExceeded => DispatchError::DeadlineExceeded,
        }
    }
}
