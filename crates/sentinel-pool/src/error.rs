//! Pool-level error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced to callers of the pool.
///
/// Steady-state failures (lost sentinel links, malformed notifications,
/// stale connections) are handled internally and never show up here.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Sentinels answered, but none of them monitors the requested primary.
    #[error("can connect to sentinels, but {primary_name} seems to be not monitored")]
    NotMonitored { primary_name: String },

    /// No sentinel could be reached.
    #[error("all sentinels down, cannot determine where {primary_name} is running")]
    SentinelsUnreachable { primary_name: String },

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    #[error("no connection became available within {waited:?}")]
    Exhausted { waited: Duration },

    #[error("pool is shut down")]
    Closed,

    #[error("pool has not been bound to a primary yet")]
    Unbound,

    #[error("failed to connect to primary: {0}")]
    Connection(#[source] common::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl PoolError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::SentinelsUnreachable { .. }
                | PoolError::Exhausted { .. }
                | PoolError::Connection(_)
        )
    }
}
