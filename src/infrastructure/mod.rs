//! Infrastructure Layer
//!
//! Implementations for external services: the shared Redis store and the
//! key expiration bridge built on top of it.

pub mod store;
