//! # Presence Gateway Library
//!
//! This crate provides a real-time presence and message-routing gateway:
//! - WebSocket endpoints for user and device connections
//! - A connection registry shared across processes through Redis
//! - A bridge turning Redis key-expiration events into an internal stream
//!
//! ## Architecture
//!
//! - **Infrastructure Layer**: shared store trait, Redis implementation,
//!   and the key expiration bridge
//! - **Presentation Layer**: WebSocket handlers, the per-namespace
//!   connection registries, and the routing façade
//! - **Shared**: error types used across layers
//!
//! ## Module Structure
//!
//! ```text
//! presence_gateway/
//! +-- config/         Configuration management
//! +-- infrastructure/ Store and expiration bridge implementations
//! +-- presentation/   Routes, WebSocket handlers, registries, router
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
