pub mod registry;
pub mod server;

pub use registry::{BenchMetrics, Histogram, HistogramSnapshot};
pub use server::MetricsServer;

use std::time::Duration;

/// Sink for the numbers the benchmark exists to produce.
pub trait Observer: Send + Sync {
    /// Executions of the unit of work in one iteration, successful or not.
    fn observe_attempts(&self, attempts: u32);

    /// Rollbacks to the restart savepoint in one savepoint-mode iteration.
    fn observe_restarts(&self, restarts: u32);

    /// Wall-clock time of a successful iteration.
    fn observe_latency(&self, latency: Duration);

    /// A backend error carrying this SQLSTATE was classified.
    fn record_error_code(&self, code: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe_attempts(&self, _attempts: u32) {}

    fn observe_restarts(&self, _restarts: u32) {}

    fn observe_latency(&self, _latency: Duration) {}

    fn record_error_code(&self, _code: &str) {}
}
