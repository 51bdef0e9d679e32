//! Resilient client-side dispatch for Tower services.
//!
//! `tower-dispatch` composes the individual pattern crates into one
//! client-side stack: every backend instance gets its own circuit breaker
//! and token bucket, instances are pooled behind a round-robin balancer,
//! and a budgeted retrying dispatcher drives each operation across the
//! pool. A proxy adapter sits on top to translate between a domain
//! request shape and the wire shape the instances speak.
//!
//! The control-flow order per attempt is breaker, then limiter, then
//! transport: an open circuit rejects before a token is spent, and a
//! spent bucket rejects before the network is touched. Either rejection
//! is retryable, so the next attempt lands on the next instance.
//!
//! # Example
//!
//! ```
//! use tower_dispatch::{DispatchBuilder, DispatchError};
//! use tower::{Service, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), DispatchError<std::io::Error>> {
//! let instance =
//!     service_fn(|req: String| async move { Ok::<_, std::io::Error>(req.to_uppercase()) });
//! let instances = vec![instance.clone(), instance];
//!
//! let mut dispatcher = DispatchBuilder::new()
//!     .rate_capacity(100)
//!     .refill_per_second(100.0)
//!     .failure_threshold(5)
//!     .cooldown(Duration::from_secs(60))
//!     .max_attempts(3)
//!     .max_elapsed(Duration::from_millis(250))
//!     .name("uppercase")
//!     .dispatcher(instances);
//!
//! let response = dispatcher.ready().await?.call("hello".to_string()).await?;
//! assert_eq!(response, "HELLO");
//! # Ok(())
//! # }
//! ```
//!
//! # Individual Crates
//!
//! Each pattern is also available as a standalone crate:
//!
//! - `tower-dispatch-ratelimiter`
//! - `tower-dispatch-circuitbreaker`
//! - `tower-dispatch-balancer`
//! - `tower-dispatch-retry`
//! - `tower-dispatch-core` (shared infrastructure)

mod builder;
mod endpoint;
mod proxy;

pub use builder::DispatchBuilder;
pub use endpoint::{endpoint, Endpoint};
pub use proxy::{DispatchProxy, ProxyAdapter, ProxyError};

pub use tower_dispatch_core as core;
pub use tower_dispatch_core::DispatchError;

pub use tower_dispatch_balancer as balancer;
pub use tower_dispatch_circuitbreaker as circuitbreaker;
pub use tower_dispatch_ratelimiter as ratelimiter;
pub use tower_dispatch_retry as retry;
