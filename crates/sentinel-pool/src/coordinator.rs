//! Single source of truth for the current primary.
//!
//! Retargeting is the only writer: it swaps the current endpoint, repoints
//! the pool factory and evicts idle connections under one mutex. Readers
//! take lock-free snapshots, and [`PoolCoordinator::acquire`] re-validates
//! every borrowed connection against the snapshot, which is what keeps
//! connections borrowed before a switch from leaking back to callers.

use crate::error::Result;
use crate::pool::{Connection, ConnectionFactory, ObjectPool, PooledConnection};
use crate::types::{Endpoint, PoolStats, StatsCounters};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Something that can be told about a (possibly) new primary.
///
/// Both the active refresh and the notification path of every listener go
/// through this one operation.
pub trait PrimaryTarget: Send + Sync {
    fn retarget(&self, candidate: Endpoint);
}

/// Owns the current primary and the pool serving it
pub struct PoolCoordinator<F: ConnectionFactory> {
    current: ArcSwapOption<Endpoint>,
    retarget_lock: Mutex<()>,
    pool: ObjectPool<F>,
    stats: StatsCounters,
}

impl<F: ConnectionFactory> PoolCoordinator<F> {
    /// Create a coordinator around an unbound pool
    pub fn new(pool: ObjectPool<F>) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            retarget_lock: Mutex::new(()),
            pool,
            stats: StatsCounters::default(),
        }
    }

    /// Snapshot of the current primary
    pub fn current_primary(&self) -> Option<Arc<Endpoint>> {
        self.current.load_full()
    }

    /// Point the pool at `candidate`.
    ///
    /// Returns `false` when `candidate` already is the current primary or
    /// the pool has been shut down.
    pub fn retarget_to(&self, candidate: Endpoint) -> bool {
        let _guard = self.lock_retarget();

        if self.pool.is_closed() {
            debug!(primary = %candidate, "Ignoring retarget of closed pool");
            return false;
        }
        if self.current.load().as_deref() == Some(&candidate) {
            return false;
        }

        self.current.store(Some(Arc::new(candidate.clone())));
        if self.pool.is_bound() {
            self.pool.configure(candidate.clone());
            // Borrowed connections survive this; acquire() catches them.
            let evicted = self.pool.evict_idle();
            info!(primary = %candidate, evicted, "Pool retargeted to primary");
        } else {
            self.pool.configure(candidate.clone());
            info!(primary = %candidate, "Created pool to primary");
        }
        self.stats.record_retarget();

        true
    }

    /// Borrow a connection that points at the current primary.
    ///
    /// Stale connections are invalidated and the borrow is retried, so the
    /// loop ends once the idle set has drained of them.
    pub async fn acquire(&self) -> Result<PooledConnection<F::Connection>> {
        loop {
            let conn = self.pool.borrow().await?;
            let is_current = self.current.load().as_deref() == Some(conn.endpoint());

            if is_current {
                self.stats.record_acquired();
                return Ok(conn);
            }

            debug!(
                connection = %conn.endpoint(),
                "Discarding connection to stale primary"
            );
            self.stats.record_stale();
            conn.invalidate();
        }
    }

    pub fn pool(&self) -> &ObjectPool<F> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Release the pool and all its idle connections.
    ///
    /// Any retarget still in flight completes first; none happens after.
    pub fn shutdown(&self) {
        let _guard = self.lock_retarget();
        self.pool.shutdown_all();
    }

    fn lock_retarget(&self) -> MutexGuard<'_, ()> {
        self.retarget_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ConnectionFactory> PrimaryTarget for PoolCoordinator<F> {
    fn retarget(&self, candidate: Endpoint) {
        self.retarget_to(candidate);
    }
}
