//! Application Error Types
//!
//! Centralized error handling for store and gateway failures.

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The shared store rejected or failed a command.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The shared store could not be reached in time. Commands issued while
    /// disconnected fail fast with this variant instead of hanging; the
    /// underlying client keeps reconnecting on its own.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for connectivity-class failures that the store client will
    /// recover from on its own. The call in flight is still lost; callers
    /// must not assume it was applied.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            AppError::StoreUnavailable(_) => true,
            AppError::Redis(e) => e.is_connection_refusal() || e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unavailable_is_classified() {
        let err = AppError::StoreUnavailable("command timed out".into());
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn internal_is_not_store_unavailable() {
        let err = AppError::Internal("bad batch".into());
        assert!(!err.is_store_unavailable());
    }
}
