//! Core infrastructure for tower-dispatch.
//!
//! This crate provides the shared pieces used across all tower-dispatch
//! modules:
//! - [`DispatchError`], the unified error type flowing through a dispatch
//!   stack
//! - the event system for observability ([`EventListeners`], [`FnListener`])

pub mod error;
pub mod events;

pub use error::DispatchError;
pub use events::{DispatchEvent, EventListener, EventListeners, FnListener};
