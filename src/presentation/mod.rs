//! Presentation Layer
//!
//! HTTP routes and WebSocket gateway handlers.

pub mod routes;
pub mod websocket;
