//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::infrastructure::store::{self, ExpiryBridge, KeyValueStore};
use crate::presentation::routes;
use crate::presentation::websocket::{namespace, ConnectionRegistry, SocketRouter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub users: Arc<ConnectionRegistry>,
    pub devices: Arc<ConnectionRegistry>,
    pub router: Arc<SocketRouter>,
    pub expiry: Option<Arc<ExpiryBridge>>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Connect the shared store (retries with capped backoff)
        let store: Arc<dyn KeyValueStore> = Arc::new(store::connect(&settings.redis).await?);
        tracing::info!("Store connection established");

        // The expiration bridge degrades gracefully: without it the gateway
        // runs fine, it just never observes key expiry.
        let expiry = match ExpiryBridge::connect(&settings.redis, settings.gateway.expiry_backlog)
            .await
        {
            Ok(bridge) => Some(Arc::new(bridge)),
            Err(e) => {
                tracing::error!(error = %e, "Key expiration bridge unavailable, continuing without expiry notifications");
                None
            }
        };

        // Keep one receiver attached for the life of the process so expiries
        // are observable in the logs even with no feature consuming them yet.
        if let Some(bridge) = &expiry {
            let mut expired = bridge.expired_keys();
            tokio::spawn(async move {
                loop {
                    match expired.recv().await {
                        Ok(key) => tracing::debug!(key = %key, "Key expired"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Expired-key stream lagged")
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }

        // One registry per identity namespace
        let users = Arc::new(ConnectionRegistry::new(namespace::USERS, store.clone()));
        let devices = Arc::new(ConnectionRegistry::new(namespace::DEVICES, store.clone()));
        let router = Arc::new(SocketRouter::new(users.clone(), devices.clone()));

        let state = AppState {
            store,
            users,
            devices,
            router,
            expiry,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state).layer(TraceLayer::new_for_http());

        // Bind to address
        let addr: SocketAddr = settings.server_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
