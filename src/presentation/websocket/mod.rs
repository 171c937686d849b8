//! WebSocket Gateway
//!
//! Real-time presence and message routing over WebSocket connections.

pub mod handler;
pub mod messages;
pub mod namespace;
pub mod registry;
pub mod router;

pub use handler::{devices_ws_handler, drive_connection, users_ws_handler};
pub use messages::{Ack, Envelope, InboundMessage, OutboundFrame};
pub use namespace::{Namespace, DEVICES, USERS};
pub use registry::{ConnectedClient, ConnectionId, ConnectionRegistry};
pub use router::SocketRouter;
