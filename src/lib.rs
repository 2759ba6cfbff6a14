// ============================================================================
// Contend Library
// ============================================================================
//
// Contention benchmark for SQL databases: many workers run read-modify-write
// transactions against a handful of rows, retrying serialization failures
// either by restarting the whole transaction or through a savepoint.
//
// ============================================================================

pub mod backend;
pub mod bench;
pub mod connection;
pub mod core;
pub mod metrics;
pub mod retry;

// Re-export main types for convenience
pub use core::{BackendError, ContendError, ContendedRecord, RecordId, Result};

pub use backend::{Backend, MemoryBackend, Operation, PgBackend, Transaction};
pub use bench::{BenchConfig, Coordinator, TransactionExecutor, Worker, WorkerConfig};
pub use connection::{
    Connection,
    config::ConnectionConfig,
    pool::{ConnectionPool, PoolGuard, PoolStats},
};
pub use metrics::{BenchMetrics, MetricsServer, NoopObserver, Observer};
pub use retry::{
    ErrorClass, ErrorClassifier, RetryEngine, RetryOutcome, SavepointOutcome,
    SavepointRetryEngine, UnitOfWork,
};
