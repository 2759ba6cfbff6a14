use super::config::WorkerConfig;
use super::executor::TransactionExecutor;
use crate::backend::{Backend, Transaction};
use crate::core::{ContendError, RecordId, Result};
use crate::metrics::Observer;
use crate::retry::{ErrorClassifier, RetryEngine, SavepointRetryEngine};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives iterations against one contended row until cancelled or failed.
///
/// Cloning is cheap; every clone shares the same row, which is how several
/// workers are made to race on one identity.
#[derive(Clone)]
pub struct Worker {
    backend: Arc<dyn Backend>,
    observer: Arc<dyn Observer>,
    config: WorkerConfig,
    executor: TransactionExecutor,
    retry: RetryEngine,
    savepoint: SavepointRetryEngine,
}

impl Worker {
    /// Allocate a fresh row and build a worker for it.
    ///
    /// Setup errors are always returned, regardless of `tolerate_errors`.
    pub async fn allocate(
        backend: Arc<dyn Backend>,
        config: WorkerConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let retry = RetryEngine::new(ErrorClassifier::new(Arc::clone(&observer)));
        let outcome = retry
            .retry_until_done(|| {
                let backend = Arc::clone(&backend);
                async move {
                    backend
                        .allocate_record()
                        .await
                        .map_err(|e| ContendError::backend("allocating unique id", e))
                }
            })
            .await;
        let record = outcome.result?;
        info!(record_id = %record, attempts = outcome.attempts, "allocated contended record");

        Ok(Self::with_record(backend, record, config, observer))
    }

    /// Build a worker for an already allocated row.
    pub fn with_record(
        backend: Arc<dyn Backend>,
        record: RecordId,
        config: WorkerConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let classifier = ErrorClassifier::new(Arc::clone(&observer));
        Self {
            backend,
            config,
            executor: TransactionExecutor::new(record, &config),
            retry: RetryEngine::new(classifier.clone()),
            savepoint: SavepointRetryEngine::new(classifier, Arc::clone(&observer)),
            observer,
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.executor.record()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run iterations until `cancel` fires or an untolerated error occurs.
    ///
    /// Cancellation is reported as `ContendError::Cancelled`, never tolerated.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ContendError::Cancelled),
                _ = tokio::time::sleep(self.config.think_time) => {}
            }

            let start = Instant::now();
            match self.run_one_iteration(&cancel).await {
                Ok(()) => self.observer.observe_latency(start.elapsed()),
                Err(ContendError::Cancelled) => return Err(ContendError::Cancelled),
                Err(err) if self.config.tolerate_errors => {
                    warn!(record_id = %self.record_id(), error = %err, "ignoring error");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One logical update of the row, retried until it commits, fails
    /// fatally or `cancel` fires. The attempt count is observed either way.
    pub async fn run_one_iteration(&self, cancel: &CancellationToken) -> Result<()> {
        let outcome = self
            .retry
            .retry_until_done(move || self.attempt_transaction(cancel))
            .await;
        self.observer.observe_attempts(outcome.attempts);
        outcome.result
    }

    /// Open a transaction, run the work and commit. Every other exit rolls
    /// the transaction back, including a cancellation seen before the commit.
    async fn attempt_transaction(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ContendError::Cancelled);
        }

        let mut tx = self
            .backend
            .begin()
            .await
            .map_err(|e| ContendError::backend(format!("open transaction {}", self.record_id()), e))?;

        let result = match self.execute_in(tx.as_mut(), cancel).await {
            Ok(()) if cancel.is_cancelled() => Err(ContendError::Cancelled),
            other => other,
        };
        if let Err(err) = result {
            if let Err(rollback_err) = tx.rollback().await {
                debug!(record_id = %self.record_id(), error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }

        tx.commit()
            .await
            .map_err(|e| ContendError::backend(format!("committing {}", self.record_id()), e))
    }

    async fn execute_in(&self, tx: &mut dyn Transaction, cancel: &CancellationToken) -> Result<()> {
        if self.config.use_savepoint {
            self.savepoint.run(tx, &self.executor, cancel).await.result
        } else {
            self.executor.execute(tx).await
        }
    }
}
