use super::UnitOfWork;
use super::classifier::{ErrorClass, ErrorClassifier};
use crate::backend::{RESTART_SAVEPOINT, Transaction};
use crate::core::{ContendError, Result};
use crate::metrics::Observer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of one savepoint loop.
#[derive(Debug)]
pub struct SavepointOutcome {
    pub result: Result<()>,
    /// Rollbacks to the savepoint. The outer transaction is never reopened.
    pub restarts: u32,
}

/// Retries the inner unit of work by rolling back to a savepoint instead of
/// restarting the whole transaction.
///
/// ```text
/// OuterOpen -> CheckpointSet -> Released          (work and RELEASE succeeded)
///                    ^     \--> Fatal             (non-transient error or cancelled)
///                    |      \-> RolledBack        (transient error)
///                    \____________/
/// ```
///
/// See <https://www.cockroachlabs.com/docs/stable/advanced-client-side-transaction-retries.html>.
#[derive(Clone)]
pub struct SavepointRetryEngine {
    classifier: ErrorClassifier,
    observer: Arc<dyn Observer>,
    savepoint: String,
}

impl SavepointRetryEngine {
    pub fn new(classifier: ErrorClassifier, observer: Arc<dyn Observer>) -> Self {
        Self {
            classifier,
            observer,
            savepoint: RESTART_SAVEPOINT.to_string(),
        }
    }

    /// Use a different savepoint name.
    pub fn with_savepoint(mut self, name: impl Into<String>) -> Self {
        self.savepoint = name.into();
        self
    }

    /// Run `unit` inside the open transaction `tx`. The caller owns the outer
    /// commit and the rollback on failure.
    ///
    /// Once `cancel` fires, a transient error ends the loop with
    /// `ContendError::Cancelled` instead of rolling back to the savepoint.
    pub async fn run(
        &self,
        tx: &mut dyn Transaction,
        unit: &dyn UnitOfWork,
        cancel: &CancellationToken,
    ) -> SavepointOutcome {
        let outcome = self.run_loop(tx, unit, cancel).await;
        self.observer.observe_restarts(outcome.restarts);
        outcome
    }

    async fn run_loop(
        &self,
        tx: &mut dyn Transaction,
        unit: &dyn UnitOfWork,
        cancel: &CancellationToken,
    ) -> SavepointOutcome {
        if let Err(e) = tx.savepoint(&self.savepoint).await {
            return SavepointOutcome {
                result: Err(ContendError::backend(format!("create savepoint {}", unit.label()), e)),
                restarts: 0,
            };
        }

        let mut restarts = 0u32;
        loop {
            let result = self.attempt(tx, unit).await;

            if self.classifier.classify_result(&result) != ErrorClass::TransientConflict {
                return SavepointOutcome { result, restarts };
            }

            if cancel.is_cancelled() {
                return SavepointOutcome {
                    result: Err(ContendError::Cancelled),
                    restarts,
                };
            }

            if let Err(e) = tx.rollback_to_savepoint(&self.savepoint).await {
                return SavepointOutcome {
                    result: Err(ContendError::backend(
                        format!("rollback to savepoint {}", unit.label()),
                        e,
                    )),
                    restarts,
                };
            }
            restarts = restarts.saturating_add(1);
            debug!(restarts, record = %unit.label(), "restarting from savepoint");
        }
    }

    async fn attempt(&self, tx: &mut dyn Transaction, unit: &dyn UnitOfWork) -> Result<()> {
        unit.run(tx).await?;
        tx.release_savepoint(&self.savepoint)
            .await
            .map_err(|e| ContendError::backend(format!("releasing savepoint {}", unit.label()), e))
    }
}
