//! Message Router
//!
//! Single contract point for outbound delivery, composing the per-namespace
//! registries. Holds no state of its own.

use std::sync::Arc;

use super::registry::ConnectionRegistry;
use crate::shared::error::AppError;

/// Façade over the user and device registries.
pub struct SocketRouter {
    users: Arc<ConnectionRegistry>,
    devices: Arc<ConnectionRegistry>,
}

impl SocketRouter {
    pub fn new(users: Arc<ConnectionRegistry>, devices: Arc<ConnectionRegistry>) -> Self {
        Self { users, devices }
    }

    /// Send an event to a specific user. False means no reachable
    /// connection; not an error.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<bool, AppError> {
        self.users.send_to(user_id, event, data).await
    }

    /// Send an event to a specific device.
    pub async fn send_to_device(
        &self,
        device_key: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<bool, AppError> {
        self.devices.send_to(device_key, event, data).await
    }

    /// Broadcast an event to all connected user clients on this process.
    pub fn broadcast(&self, event: &str, data: serde_json::Value) {
        self.users.broadcast(event, data);
    }
}
