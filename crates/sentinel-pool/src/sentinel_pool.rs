//! The failover-aware pool: bootstrap, listeners and shutdown.

use crate::config::PoolConfig;
use crate::coordinator::{PoolCoordinator, PrimaryTarget};
use crate::discovery::discover_primary;
use crate::error::{PoolError, Result};
use crate::link::SentinelConnector;
use crate::listener::{FailoverListener, ListenerHandle};
use crate::pool::{ConnectionFactory, ObjectPool, PooledConnection};
use crate::tcp::{TcpConnectionFactory, TcpSentinelConnector};
use crate::transport::TlsClient;
use crate::types::{Endpoint, ListenerState, PoolStats};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;
use validator::Validate;

/// Connection pool that always serves the primary the sentinels agree on
pub struct SentinelPool<F: ConnectionFactory> {
    config: PoolConfig,
    coordinator: Arc<PoolCoordinator<F>>,
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl SentinelPool<TcpConnectionFactory> {
    /// Build a pool speaking RESP over TCP (or TLS) to sentinels and primary.
    pub async fn connect(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let tls = if config.tls.enabled {
            Some(TlsClient::from_settings(&config.tls)?)
        } else {
            None
        };

        let connector = Arc::new(TcpSentinelConnector::new(
            config.connection_timeout,
            config.read_timeout,
            tls.clone(),
        ));
        let factory = TcpConnectionFactory::from_config(&config, tls);

        Self::start(config, connector, factory).await
    }
}

impl<F: ConnectionFactory> SentinelPool<F> {
    /// Build a pool from explicit sentinel and connection collaborators.
    ///
    /// Discovers the primary synchronously, binds the pool to it, then starts
    /// one listener per sentinel. Fails with [`PoolError::NotMonitored`] or
    /// [`PoolError::SentinelsUnreachable`] when bootstrap finds no primary.
    pub async fn with_collaborators(
        config: PoolConfig,
        connector: Arc<dyn SentinelConnector>,
        factory: F,
    ) -> Result<Self> {
        config.validate()?;
        Self::start(config, connector, factory).await
    }

    async fn start(
        config: PoolConfig,
        connector: Arc<dyn SentinelConnector>,
        factory: F,
    ) -> Result<Self> {
        let primary = discover_primary(
            connector.as_ref(),
            &config.sentinels,
            &config.primary_name,
            config.sentinel_password.as_deref(),
        )
        .await?;

        let coordinator = Arc::new(PoolCoordinator::new(ObjectPool::new(
            factory,
            config.pool.clone(),
        )));
        coordinator.retarget_to(primary.clone());

        info!(
            primary = %primary,
            sentinels = config.sentinels.len(),
            "Primary running, starting sentinel listeners"
        );

        let target: Arc<dyn PrimaryTarget> = coordinator.clone();
        let listeners = config
            .sentinels
            .iter()
            .map(|sentinel| {
                FailoverListener::new(
                    sentinel.clone(),
                    config.primary_name.clone(),
                    config.sentinel_password.clone(),
                    config.subscribe_retry_wait,
                    connector.clone(),
                    target.clone(),
                )
                .spawn()
            })
            .collect();

        Ok(Self {
            config,
            coordinator,
            listeners: Mutex::new(listeners),
        })
    }

    /// Borrow a connection to the current primary
    pub async fn get(&self) -> Result<PooledConnection<F::Connection>> {
        if self.coordinator.pool().is_closed() {
            return Err(PoolError::Closed);
        }
        self.coordinator.acquire().await
    }

    /// Snapshot of the current primary. Always set once construction succeeded.
    pub fn current_primary(&self) -> Option<Arc<Endpoint>> {
        self.coordinator.current_primary()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        self.coordinator.stats()
    }

    pub fn idle_count(&self) -> usize {
        self.coordinator.pool().idle_count()
    }

    pub fn active_count(&self) -> usize {
        self.coordinator.pool().active_count()
    }

    /// State of every listener that has not been shut down
    pub fn listener_states(&self) -> Vec<(Endpoint, ListenerState)> {
        self.lock_listeners()
            .iter()
            .map(|l| (l.sentinel().clone(), l.state()))
            .collect()
    }

    /// Stop every listener, then release the pool.
    ///
    /// Listeners are signalled, not awaited; a listener may still be winding
    /// down when this returns, but it will not retarget the pool again.
    pub fn shutdown(&self) {
        let listeners = std::mem::take(&mut *self.lock_listeners());
        if listeners.is_empty() && self.coordinator.pool().is_closed() {
            return;
        }

        for listener in &listeners {
            listener.shutdown();
        }
        self.coordinator.shutdown();
        info!(primary = %self.config.primary_name, "Sentinel pool shut down");
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<ListenerHandle>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ConnectionFactory> Drop for SentinelPool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
