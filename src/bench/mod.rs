// ============================================================================
// Benchmark Harness
// ============================================================================
//
// Coordinator -> Worker -> (Retry | Savepoint) engine -> TransactionExecutor
//
// ============================================================================

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod group;
pub mod worker;

pub use config::{BenchConfig, WorkerConfig};
pub use coordinator::Coordinator;
pub use executor::TransactionExecutor;
pub use group::TaskGroup;
pub use worker::Worker;
