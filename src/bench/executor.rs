use super::config::WorkerConfig;
use crate::backend::Transaction;
use crate::core::{ContendError, RecordId, Result};
use crate::retry::UnitOfWork;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// One read-think-write cycle against a single contended row.
///
/// Runs inside a transaction opened by the caller and never retries on its
/// own.
#[derive(Debug, Clone, Copy)]
pub struct TransactionExecutor {
    record: RecordId,
    lock_on_read: bool,
    think_time: Duration,
}

impl TransactionExecutor {
    pub fn new(record: RecordId, config: &WorkerConfig) -> Self {
        Self {
            record,
            lock_on_read: config.lock_on_read,
            think_time: config.think_time,
        }
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub async fn execute(&self, tx: &mut dyn Transaction) -> Result<()> {
        let current = tx
            .read_value(self.record, self.lock_on_read)
            .await
            .map_err(|e| ContendError::backend(format!("select current value {}", self.record), e))?;

        // Simulated application work while the row is held.
        tokio::time::sleep(self.think_time).await;

        let next = rand::rng().random_range(0..i64::MAX);
        trace!(record_id = %self.record, current, next, "updating");
        tx.write_value(self.record, next)
            .await
            .map_err(|e| ContendError::backend(format!("updating {}", self.record), e))
    }
}

#[async_trait]
impl UnitOfWork for TransactionExecutor {
    async fn run(&self, tx: &mut dyn Transaction) -> Result<()> {
        self.execute(tx).await
    }

    fn label(&self) -> String {
        self.record.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend, Operation};

    fn config(lock_on_read: bool) -> WorkerConfig {
        WorkerConfig {
            lock_on_read,
            think_time: Duration::from_millis(1),
            tolerate_errors: false,
            use_savepoint: false,
        }
    }

    #[tokio::test]
    async fn test_execute_writes_inside_transaction() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        let executor = TransactionExecutor::new(id, &config(true));

        let mut tx = backend.begin().await.unwrap();
        executor.execute(tx.as_mut()).await.unwrap();
        assert_eq!(backend.value(id), Some(0));
        tx.commit().await.unwrap();

        let stats = backend.stats();
        assert_eq!(stats.locked_reads, 1);
        assert_eq!(stats.committed_writes, 1);
    }

    #[tokio::test]
    async fn test_read_error_stops_before_write() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        backend.fail_next(Operation::Read, "40001", 1);
        backend.fail_next(Operation::Write, "23505", 1);
        let executor = TransactionExecutor::new(id, &config(false));

        let mut tx = backend.begin().await.unwrap();
        let err = executor.execute(tx.as_mut()).await.unwrap_err();
        assert_eq!(err.sql_state(), Some("40001"));
        assert!(err.to_string().starts_with(&format!("select current value {id}")));
        assert_eq!(backend.pending_faults(), 1);
        assert_eq!(backend.stats().locked_reads, 0);
    }

    #[tokio::test]
    async fn test_write_error_is_annotated() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        backend.fail_next(Operation::Write, "23505", 1);
        let executor = TransactionExecutor::new(id, &config(false));

        let mut tx = backend.begin().await.unwrap();
        let err = executor.execute(tx.as_mut()).await.unwrap_err();
        assert!(err.to_string().starts_with(&format!("updating {id}")));
        assert_eq!(executor.label(), id.to_string());
    }
}
