use thiserror::Error;

/// Errors returned when picking from a balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BalancerError {
    /// The pool holds no instances.
    #[error("no instances in pool")]
    NoInstances,
}
