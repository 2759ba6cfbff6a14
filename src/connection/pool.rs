use super::{Connection, config::ConnectionConfig};
use crate::core::{ContendError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

type IdleQueue = Arc<Mutex<VecDeque<PooledConnection>>>;

/// Connection pool
///
/// Bounded by `max_connections`: once every connection is checked out,
/// `get_connection` waits until a guard is dropped.
pub struct ConnectionPool {
    /// Pool configuration
    config: ConnectionConfig,
    /// Idle connections
    available: IdleQueue,
    /// One permit per connection that may be checked out
    permits: Arc<Semaphore>,
    /// Total number of live connections
    total_connections: Arc<AtomicUsize>,
    /// Next connection ID
    next_id: AtomicU64,
}

/// An idle connection waiting in the pool
struct PooledConnection {
    connection: Connection,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        Self {
            connection,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.connection.age() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    /// Create a new, empty connection pool
    ///
    /// Connections are opened lazily on first use.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate().map_err(ContendError::Config)?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Get a connection from the pool, waiting while the pool is saturated
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let acquire = self.permits.clone().acquire_owned();
        let permit = match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                ContendError::Pool("Connection pool timeout: no connections available".into())
            })?,
            None => acquire.await,
        }
        .map_err(|_| ContendError::Pool("Connection pool is closed".into()))?;

        while let Some(pooled) = self.try_get_available() {
            let mut connection = pooled.connection;

            // A guard dropped mid-transaction leaves the transaction open on
            // the server; it must be rolled back before anyone reuses it.
            if connection.is_in_transaction() {
                if let Err(e) = connection.rollback().await {
                    warn!(connection_id = connection.id(), error = %e, "discarding connection after failed rollback");
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
            }

            return Ok(self.guard(connection, permit));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Connection::connect(id, &self.config).await?;
        self.total_connections.fetch_add(1, Ordering::SeqCst);
        debug!(connection_id = id, "opened connection");

        Ok(self.guard(connection, permit))
    }

    fn guard(&self, connection: Connection, permit: OwnedSemaphorePermit) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
            _permit: permit,
        }
    }

    /// Pop the first reusable idle connection, dropping stale ones
    fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().ok()?;

        while let Some(pooled) = available.pop_front() {
            if pooled.connection.is_closed()
                || pooled.is_expired(self.config.max_lifetime)
                || pooled.is_idle_too_long(self.config.idle_timeout)
            {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            return Some(pooled);
        }

        None
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.available.lock().map(|a| a.len()).unwrap_or(0);
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: idle,
            active_connections: total.saturating_sub(idle),
            max_connections: self.config.max_connections,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped. Closed connections are
/// discarded instead.
pub struct PoolGuard {
    connection: Option<Connection>,
    pool: IdleQueue,
    total_connections: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("Connection already returned to pool")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if connection.is_closed() {
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        match self.pool.lock() {
            Ok(mut pool) => pool.push_back(PooledConnection::new(connection)),
            Err(_) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation_is_lazy() {
        let config = ConnectionConfig::default().max_connections(5);
        let pool = ConnectionPool::new(config).unwrap();
        let stats = pool.stats();

        assert_eq!(stats, PoolStats {
            total_connections: 0,
            available_connections: 0,
            active_connections: 0,
            max_connections: 5,
        });
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ConnectionConfig::default().max_connections(0);
        assert!(matches!(ConnectionPool::new(config), Err(ContendError::Config(_))));

        let config = ConnectionConfig::default().max_connections(usize::MAX);
        assert!(matches!(ConnectionPool::new(config), Err(ContendError::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_connect_releases_permit() {
        let config = ConnectionConfig::from_url(
            "postgresql://root@127.0.0.1:1/defaultdb?sslmode=disable&connect_timeout=1",
        )
        .unwrap()
        .max_connections(1)
        .connect_timeout(Duration::from_secs(5));
        let pool = ConnectionPool::new(config).unwrap();

        for _ in 0..2 {
            let err = pool.get_connection().await.err().unwrap();
            assert!(matches!(err, ContendError::Backend { .. }), "unexpected error: {err}");
        }
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[test]
    fn test_pool_stats_display() {
        let stats = PoolStats {
            total_connections: 4,
            available_connections: 1,
            active_connections: 3,
            max_connections: 10,
        };
        assert_eq!(stats.to_string(), "Pool Stats: 3/4 active, 1 available, max 10");
    }
}
