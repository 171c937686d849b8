//! Connection Registry
//!
//! Maintains the live mapping from logical identity to connection handle for
//! one namespace. The mapping lives in a hash in the shared store so it is
//! visible across processes; the registry additionally owns the process-local
//! binding from connection handle to transport channel.
//!
//! Registration and deregistration are the only mutators of the local
//! connection set. Registry writes go through single-key hash operations the
//! store executes atomically, so two tasks never race on the same identity's
//! entry beyond last-writer-wins.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::messages::{Envelope, OutboundFrame};
use super::namespace::Namespace;
use crate::infrastructure::store::KeyValueStore;
use crate::shared::error::AppError;

/// Process-unique handle for a live connection. Not unique across processes
/// without a process discriminator; see `send_to` for the consequence.
pub type ConnectionId = String;

/// A registered connection: the identity captured at registration time and
/// the channel feeding its writer task.
pub struct ConnectedClient {
    pub connection_id: ConnectionId,
    pub identity: String,
    pub sender: mpsc::UnboundedSender<OutboundFrame>,
}

/// Registry for one identity namespace ("user" or "device").
pub struct ConnectionRegistry {
    namespace: Namespace,
    store: Arc<dyn KeyValueStore>,
    /// Live local connections by handle
    connections: DashMap<ConnectionId, Arc<ConnectedClient>>,
    /// Logical group name -> member connection handles
    groups: DashMap<String, Vec<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new(namespace: Namespace, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            namespace,
            store,
            connections: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Registers a connection for an identity.
    ///
    /// Writes the registry entry to the shared hash (overwriting any entry a
    /// previous connection left for the same identity) and joins the
    /// connection to the identity's logical group. A store failure leaves
    /// the connection unregistered; the caller should close it.
    pub async fn register(
        &self,
        identity: &str,
        connection_id: &str,
        sender: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Result<(), AppError> {
        self.store
            .hset(self.namespace.registry_key(), identity, connection_id)
            .await?;

        let client = Arc::new(ConnectedClient {
            connection_id: connection_id.to_string(),
            identity: identity.to_string(),
            sender,
        });
        self.connections.insert(connection_id.to_string(), client);
        self.groups
            .entry(self.namespace.group(identity))
            .or_default()
            .push(connection_id.to_string());

        tracing::info!(
            namespace = self.namespace.label(),
            connection_id = %connection_id,
            identity = %identity,
            "Client connected"
        );

        Ok(())
    }

    /// Deregisters a connection on disconnect, graceful or abnormal.
    ///
    /// Removes the shared registry entry using the identity captured at
    /// registration time; a connection never changes identity mid-lifetime.
    /// Unknown handles are a no-op (the connection was rejected before
    /// registering, or already cleaned up).
    pub async fn unregister(&self, connection_id: &str) -> Result<(), AppError> {
        let Some((_, client)) = self.connections.remove(connection_id) else {
            return Ok(());
        };

        if let Some(mut members) = self.groups.get_mut(&self.namespace.group(&client.identity)) {
            members.retain(|member| member != connection_id);
        }

        self.store
            .hdel(self.namespace.registry_key(), &client.identity)
            .await?;

        tracing::info!(
            namespace = self.namespace.label(),
            connection_id = %connection_id,
            identity = %client.identity,
            "Client disconnected"
        );

        Ok(())
    }

    /// Directed delivery: resolves the identity through the shared registry
    /// and pushes the event to the owning connection if it is local.
    ///
    /// Returns false when the identity has no registry entry, when the
    /// registered handle belongs to a process this registry cannot see, or
    /// when the local connection is already gone. Best effort, at most once,
    /// never queued or retried.
    pub async fn send_to(
        &self,
        identity: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<bool, AppError> {
        let handle = self
            .store
            .hget(self.namespace.registry_key(), identity)
            .await?;

        let Some(handle) = handle else {
            return Ok(false);
        };

        match self.connections.get(&handle) {
            Some(client) => Ok(client
                .sender
                .send(OutboundFrame::Event(Envelope::new(event, data)))
                .is_ok()),
            None => Ok(false),
        }
    }

    /// Fan-out to every local member of an identity's logical group,
    /// returning how many connections the event was pushed to. Unlike
    /// `send_to` this does not consult the shared registry.
    pub fn send_to_group(&self, identity: &str, event: &str, data: serde_json::Value) -> usize {
        let Some(members) = self.groups.get(&self.namespace.group(identity)) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in members.value() {
            if let Some(client) = self.connections.get(connection_id) {
                if client
                    .sender
                    .send(OutboundFrame::Event(Envelope::new(event, data.clone())))
                    .is_ok()
                {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Pushes an event to every live connection held by this process,
    /// independent of the registry contents.
    pub fn broadcast(&self, event: &str, data: serde_json::Value) {
        for entry in self.connections.iter() {
            let _ = entry
                .sender
                .send(OutboundFrame::Event(Envelope::new(event, data.clone())));
        }
    }

    /// Number of live local connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
