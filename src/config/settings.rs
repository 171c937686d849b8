//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// WebSocket gateway configuration
    pub gateway: GatewaySettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Redis configuration.
///
/// Individual fields rather than a single URL so that each value can be
/// overridden independently from the environment (`REDIS_HOST`, `REDIS_PORT`,
/// `REDIS_PASSWORD`, `REDIS_DB`, `REDIS_PREFIX`).
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis host (default: "localhost")
    pub host: String,

    /// Redis port (default: 6379)
    pub port: u16,

    /// Redis password (default: empty = no auth)
    pub password: String,

    /// Logical database index (default: 0)
    pub db: i64,

    /// Prefix prepended to every key issued through the store (default: empty)
    pub key_prefix: String,

    /// Per-command timeout in milliseconds; an elapsed timeout is reported
    /// as "store unavailable"
    pub command_timeout_ms: u64,
}

impl RedisSettings {
    /// Build the connection URL for the redis client.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Backlog of the in-process expired-key stream. Events beyond this
    /// backlog are dropped for lagging consumers, never buffered durably.
    pub expiry_backlog: usize,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379)?
            .set_default("redis.password", "")?
            .set_default("redis.db", 0)?
            .set_default("redis.key_prefix", "")?
            .set_default("redis.command_timeout_ms", 5000)?
            .set_default("gateway.expiry_backlog", 1024_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("redis.host", std::env::var("REDIS_HOST").ok())?
            .set_override_option("redis.port", std::env::var("REDIS_PORT").ok())?
            .set_override_option("redis.password", std::env::var("REDIS_PASSWORD").ok())?
            .set_override_option("redis.db", std::env::var("REDIS_DB").ok())?
            .set_override_option("redis.key_prefix", std::env::var("REDIS_PREFIX").ok())?
            .build()?
            .try_deserialize()
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
