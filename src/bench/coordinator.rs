use super::config::BenchConfig;
use super::group::TaskGroup;
use super::worker::Worker;
use crate::backend::Backend;
use crate::core::{RecordId, Result};
use crate::metrics::Observer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Allocates the contended rows and runs every worker as one fail-fast group.
pub struct Coordinator {
    backend: Arc<dyn Backend>,
    config: BenchConfig,
    observer: Arc<dyn Observer>,
}

impl Coordinator {
    pub fn new(backend: Arc<dyn Backend>, config: BenchConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            backend,
            config,
            observer,
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run until `cancel` fires or a worker fails.
    ///
    /// Rows are allocated one after another and each row's workers start as
    /// soon as it exists. Returns the first worker or setup error; workers
    /// stopped by cancellation are not an error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let worker_config = self.config.worker_config();
        let mut group = TaskGroup::new(cancel);
        let mut records: Vec<RecordId> = Vec::with_capacity(self.config.unique_ids);

        for _ in 0..self.config.unique_ids {
            if group.token().is_cancelled() {
                break;
            }

            let worker = match Worker::allocate(
                Arc::clone(&self.backend),
                worker_config,
                Arc::clone(&self.observer),
            )
            .await
            {
                Ok(worker) => worker,
                Err(err) => {
                    group.cancel();
                    // A worker error that raced the setup failure loses.
                    let _ = group.wait().await;
                    return Err(err);
                }
            };

            records.push(worker.record_id());
            for _ in 0..self.config.workers_per_id {
                group.spawn(worker.clone().run(group.token()));
            }
        }

        info!(
            records = records.len(),
            workers = group.len(),
            savepoint = worker_config.use_savepoint,
            select_for_update = worker_config.lock_on_read,
            "workers running"
        );

        group.wait().await
    }
}
