// ============================================================================
// Retry Protocol
// ============================================================================
//
// Two strategies for absorbing transient conflicts:
// - `RetryEngine`: rerun the whole unit of work (and its transaction)
// - `SavepointRetryEngine`: keep the transaction, roll back to a savepoint
//
// Both consult the same `ErrorClassifier`.
//
// ============================================================================

pub mod classifier;
pub mod engine;
pub mod savepoint;

pub use classifier::{ErrorClass, ErrorClassifier, TRANSIENT_SQL_STATES, is_transient};
pub use engine::{RetryEngine, RetryOutcome};
pub use savepoint::{SavepointOutcome, SavepointRetryEngine};

use crate::backend::Transaction;
use crate::core::Result;
use async_trait::async_trait;

/// Work executed inside a transaction opened by someone else.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn run(&self, tx: &mut dyn Transaction) -> Result<()>;

    /// Short description used in error context.
    fn label(&self) -> String;
}
