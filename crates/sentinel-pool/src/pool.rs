//! Generic connection pool bound to a single, re-pointable endpoint.

use crate::config::PoolSettings;
use crate::error::{PoolError, Result};
use crate::types::Endpoint;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// A pooled connection that knows which endpoint it was opened against
pub trait Connection: Send + 'static {
    fn endpoint(&self) -> &Endpoint;
}

/// Builds connections for the pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, endpoint: &Endpoint) -> common::Result<Self::Connection>;
}

struct PoolState<C> {
    target: Option<Endpoint>,
    idle: VecDeque<C>,
    closed: bool,
}

struct Shared<C> {
    state: Mutex<PoolState<C>>,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pool of reusable connections to one configurable endpoint
pub struct ObjectPool<F: ConnectionFactory> {
    factory: F,
    settings: PoolSettings,
    slots: Arc<Semaphore>,
    shared: Arc<Shared<F::Connection>>,
}

impl<F: ConnectionFactory> ObjectPool<F> {
    /// Create an unbound pool. Borrows fail until [`Self::configure`] is called.
    pub fn new(factory: F, settings: PoolSettings) -> Self {
        Self {
            factory,
            slots: Arc::new(Semaphore::new(settings.max_size)),
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    target: None,
                    idle: VecDeque::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Point the factory at `endpoint`. Existing connections are untouched.
    pub fn configure(&self, endpoint: Endpoint) {
        self.shared.lock().target = Some(endpoint);
    }

    /// Whether the pool has ever been configured
    pub fn is_bound(&self) -> bool {
        self.shared.lock().target.is_some()
    }

    /// Endpoint new connections are opened against
    pub fn target(&self) -> Option<Endpoint> {
        self.shared.lock().target.clone()
    }

    /// Borrow a connection, reusing an idle one when available.
    ///
    /// Waits up to the configured borrow timeout when the pool is at capacity.
    pub async fn borrow(&self) -> Result<PooledConnection<F::Connection>> {
        let waited = self.settings.borrow_timeout;
        let permit = match tokio::time::timeout(waited, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => return Err(PoolError::Exhausted { waited }),
        };

        let target = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(conn) = state.idle.pop_back() {
                return Ok(PooledConnection::new(conn, &self.shared, permit));
            }
            state.target.clone().ok_or(PoolError::Unbound)?
        };

        debug!(endpoint = %target, "Opening new pooled connection");
        let conn = self
            .factory
            .connect(&target)
            .await
            .map_err(PoolError::Connection)?;

        Ok(PooledConnection::new(conn, &self.shared, permit))
    }

    /// Drop every idle connection; borrowed connections are left alone.
    ///
    /// Returns the number of connections evicted.
    pub fn evict_idle(&self) -> usize {
        let evicted = std::mem::take(&mut self.shared.lock().idle);
        evicted.len()
    }

    /// Close the pool: drop idle connections and fail all future borrows.
    pub fn shutdown_all(&self) {
        let evicted = {
            let mut state = self.shared.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.slots.close();
        debug!(evicted = evicted.len(), "Pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn idle_count(&self) -> usize {
        self.shared.lock().idle.len()
    }

    /// Connections currently borrowed
    pub fn active_count(&self) -> usize {
        if self.slots.is_closed() {
            return 0;
        }
        self.settings
            .max_size
            .saturating_sub(self.slots.available_permits())
    }
}

/// A borrowed connection.
///
/// Dropping it returns the connection to the idle set; [`Self::invalidate`]
/// destroys it instead.
pub struct PooledConnection<C: Connection> {
    conn: Option<C>,
    pool: Weak<Shared<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connection> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("endpoint", &self.conn.as_ref().map(|c| c.endpoint()))
            .finish_non_exhaustive()
    }
}

impl<C: Connection> PooledConnection<C> {
    fn new(conn: C, shared: &Arc<Shared<C>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            pool: Arc::downgrade(shared),
            _permit: permit,
        }
    }

    /// Discard the connection instead of returning it to the pool
    pub fn invalidate(mut self) {
        self.conn.take();
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
            .as_ref()
            .expect("pooled connection is present until dropped")
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
            .as_mut()
            .expect("pooled connection is present until dropped")
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Some(shared) = self.pool.upgrade() {
            let mut state = shared.lock();
            if !state.closed {
                state.idle.push_back(conn);
            }
        }
    }
}
