//! Failover-aware connection pool for sentinel-managed primaries.
//!
//! The pool asks a quorum of sentinels where the primary currently runs,
//! binds itself to that endpoint, and keeps one listener per sentinel
//! subscribed to `+switch-master`. When any listener learns of a new
//! primary, the pool is retargeted: idle connections are evicted, and
//! connections borrowed before the switch are discarded when they come back.
//!
//! # Features
//!
//! - One async listener task per sentinel, with fixed-wait reconnects
//! - Active refresh of the primary address on every (re)subscribe
//! - Lock-free reads of the current primary
//! - Stale connections never handed to callers
//! - Optional TLS for sentinel and primary connections
//!
//! # Example
//!
//! ```no_run
//! use sentinel_pool::{PoolConfig, SentinelPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::new(
//!     "mymaster",
//!     vec!["10.0.0.1:26379".parse()?, "10.0.0.2:26379".parse()?],
//! );
//!
//! let pool = SentinelPool::connect(config).await?;
//! let mut conn = pool.get().await?;
//! conn.ping().await?;
//!
//! println!("primary is {:?}", pool.current_primary());
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod link;
pub mod listener;
pub mod pool;
pub mod resp;
pub mod sentinel_pool;
pub mod tcp;
pub mod transport;
pub mod types;

pub use config::{PoolConfig, PoolSettings, TlsSettings};
pub use coordinator::{PoolCoordinator, PrimaryTarget};
pub use discovery::discover_primary;
pub use error::{PoolError, Result};
pub use link::{PublishedMessage, SentinelConnector, SentinelLink};
pub use listener::{FailoverListener, ListenerHandle};
pub use pool::{Connection, ConnectionFactory, ObjectPool, PooledConnection};
pub use sentinel_pool::SentinelPool;
pub use tcp::{KvConnection, TcpConnectionFactory, TcpSentinelConnector};
pub use types::{Endpoint, FailoverNotification, ListenerState, PoolStats};
