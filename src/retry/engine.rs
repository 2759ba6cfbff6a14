use super::classifier::{ErrorClass, ErrorClassifier};
use crate::core::Result;
use std::future::Future;
use tracing::debug;

/// Final result of a retry loop together with how many times the unit of
/// work ran.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Re-runs a unit of work until it succeeds or fails with a non-transient
/// error.
///
/// There is no backoff and no attempt cap: the benchmark measures the raw
/// cost of contention, so a loop that never terminates under sustained
/// conflicts is expected behavior.
#[derive(Clone)]
pub struct RetryEngine {
    classifier: ErrorClassifier,
}

impl RetryEngine {
    pub fn new(classifier: ErrorClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub async fn retry_until_done<T, F, Fut>(&self, mut unit_of_work: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let result = unit_of_work().await;

            match self.classifier.classify_result(&result) {
                ErrorClass::TransientConflict => {
                    if let Err(err) = &result {
                        debug!(attempt = attempts, error = %err, "retrying transient conflict");
                    }
                }
                ErrorClass::None | ErrorClass::Fatal => {
                    return RetryOutcome { result, attempts };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BackendError, ContendError};
    use crate::metrics::NoopObserver;
    use std::sync::Arc;

    fn engine() -> RetryEngine {
        RetryEngine::new(ErrorClassifier::new(Arc::new(NoopObserver)))
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let outcome = engine().retry_until_done(|| async { Ok(7) }).await;
        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut calls = 0;
        let outcome = engine()
            .retry_until_done(|| {
                calls += 1;
                let call = calls;
                async move {
                    if call < 4 {
                        Err(ContendError::backend("x", BackendError::with_code("08006", "reset")))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_uncoded_error_is_not_retried() {
        let outcome: RetryOutcome<()> = engine()
            .retry_until_done(|| async { Err(ContendError::Pool("closed".into())) })
            .await;

        assert!(matches!(outcome.result, Err(ContendError::Pool(_))));
        assert_eq!(outcome.attempts, 1);
    }
}
