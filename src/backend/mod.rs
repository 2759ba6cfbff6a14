// ============================================================================
// Storage Backends
// ============================================================================
//
// The benchmark only ever talks to the store through these two traits:
// `Backend` hands out transactions, `Transaction` carries the handful of
// statements a worker issues against the `contend` table.
//
// ============================================================================

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBackend, MemoryStats, Operation};
pub use postgres::PgBackend;

use crate::connection::config::{BackendKind, ConnectionConfig};
use crate::connection::pool::PoolStats;
use crate::core::{BackendError, RecordId, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Name of the checkpoint used by the savepoint retry loop. CockroachDB
/// treats this name specially and restarts the transaction at a higher
/// priority when it is rolled back.
pub const RESTART_SAVEPOINT: &str = "cockroach_restart";

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// An open transaction on the backend.
///
/// Dropping a transaction without calling `commit` or `rollback` must not
/// leave its writes visible.
#[async_trait]
pub trait Transaction: Send {
    /// Current value of the record, optionally taking a row lock.
    async fn read_value(&mut self, id: RecordId, for_update: bool) -> BackendResult<i64>;

    async fn write_value(&mut self, id: RecordId, value: i64) -> BackendResult<()>;

    async fn savepoint(&mut self, name: &str) -> BackendResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> BackendResult<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> BackendResult<()>;

    async fn commit(&mut self) -> BackendResult<()>;

    async fn rollback(&mut self) -> BackendResult<()>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Create the `contend` table if it does not exist.
    async fn bootstrap(&self) -> Result<()>;

    /// Insert a fresh row and return its server-assigned identity.
    async fn allocate_record(&self) -> BackendResult<RecordId>;

    /// Open a transaction, waiting for a pooled connection if necessary.
    async fn begin(&self) -> BackendResult<Box<dyn Transaction>>;

    /// Connection pool occupancy, for backends that pool connections.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Build the backend selected by the connection URL scheme.
pub fn connect(config: ConnectionConfig) -> Result<Arc<dyn Backend>> {
    match config.kind {
        BackendKind::Postgres => Ok(Arc::new(PgBackend::new(config)?)),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
