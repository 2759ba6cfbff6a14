use crate::core::{ContendError, Result};
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fail-fast group of tasks sharing one cancellation token.
///
/// The first task to fail with anything other than `ContendError::Cancelled`
/// cancels the token; `wait` then drains the rest and reports that first
/// error.
pub struct TaskGroup {
    tasks: JoinSet<Result<()>>,
    token: CancellationToken,
}

impl TaskGroup {
    /// A group whose token is cancelled with `parent` but can also be
    /// cancelled on its own.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token: parent.child_token(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            let result = task.await;
            if matches!(&result, Err(err) if !err.is_cancelled()) {
                token.cancel();
            }
            result
        });
    }

    /// Wait for every task. Returns the first non-cancellation error, or
    /// `Ok(())` when all tasks finished cleanly or by cancellation.
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(ContendError::Task(e.to_string())));
            match result {
                Ok(()) | Err(ContendError::Cancelled) => {}
                Err(err) => {
                    self.token.cancel();
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn until_cancelled(token: CancellationToken) -> Result<()> {
        token.cancelled().await;
        Err(ContendError::Cancelled)
    }

    async fn explode() -> Result<()> {
        panic!("worker exploded")
    }

    #[tokio::test]
    async fn test_first_error_cancels_siblings() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        for _ in 0..3 {
            group.spawn(until_cancelled(group.token()));
        }
        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(ContendError::Config("first".into()))
        });
        assert_eq!(group.len(), 4);

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, ContendError::Config(msg) if msg == "first"));
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_is_clean() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        for _ in 0..3 {
            group.spawn(until_cancelled(group.token()));
        }

        root.cancel();
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        group.spawn(until_cancelled(group.token()));
        group.spawn(explode());

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, ContendError::Task(_)));
    }
}
