use std::time::Duration;
use thiserror::Error;
use tower_dispatch_core::DispatchError;

/// Errors returned by the `RateLimiter` service.
#[derive(Debug, Error)]
pub enum RateLimiterError<E> {
    /// The bucket had no token available; the call was rejected locally.
    #[error("rate limited")]
    RateLimited {
        /// Time until one token accrues, if the bucket refills at all.
        retry_after: Option<Duration>,
    },

    /// An error returned by the inner service.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> RateLimiterError<E> {
    /// Returns true if the error is a local rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RateLimiterError::RateLimited { .. })
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimiterError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<RateLimiterError<E>> for DispatchError<E> {
    fn from(err: RateLimiterError<E>) -> Self {
        match err {
            RateLimiterError::RateLimited { retry_after } => {
                DispatchError::RateLimited { retry_after }
            }
            RateLimiterError::Inner(e) => DispatchError::Transport(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers() {
        let err: RateLimiterError<&str> = RateLimiterError::RateLimited { retry_after: None };
        assert!(err.is_rate_limited());
        assert_eq!(err.into_inner(), None);

        let err = RateLimiterError::Inner("fail");
        assert!(!err.is_rate_limited());
        assert_eq!(err.into_inner(), Some("fail"));
    }

    #[test]
    fn converts_to_dispatch_error() {
        let err: DispatchError<&str> =
            RateLimiterError::<&str>::RateLimited { retry_after: None }.into();
        assert!(err.is_rate_limited());
    }
}
