use crate::connection::config::ConnectionConfig;
use crate::core::{ContendError, Result};
use std::time::Duration;

/// Settings for one benchmark run. Built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Backend URL and pool limits
    pub connection: ConnectionConfig,

    /// Pause before each iteration and inside each transaction
    pub think_time: Duration,

    /// Log fatal iteration errors and keep going instead of stopping the run
    pub tolerate_errors: bool,

    /// Number of contended rows
    pub unique_ids: usize,

    /// Workers racing on each row
    pub workers_per_id: usize,

    /// Read with `SELECT ... FOR UPDATE`
    pub select_for_update: bool,

    /// Retry through a savepoint instead of restarting the transaction
    pub savepoint: bool,

    /// Bind address of the metrics endpoint
    pub metrics_addr: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default().max_connections(10_000),
            think_time: Duration::from_millis(25),
            tolerate_errors: false,
            unique_ids: 1,
            workers_per_id: 1,
            select_for_update: false,
            savepoint: false,
            metrics_addr: ":8181".to_string(),
        }
    }
}

impl BenchConfig {
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn tolerate_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_errors = tolerate;
        self
    }

    pub fn unique_ids(mut self, unique_ids: usize) -> Self {
        self.unique_ids = unique_ids;
        self
    }

    pub fn workers_per_id(mut self, workers_per_id: usize) -> Self {
        self.workers_per_id = workers_per_id;
        self
    }

    pub fn select_for_update(mut self, enabled: bool) -> Self {
        self.select_for_update = enabled;
        self
    }

    pub fn savepoint(mut self, enabled: bool) -> Self {
        self.savepoint = enabled;
        self
    }

    pub fn metrics_addr(mut self, addr: &str) -> Self {
        self.metrics_addr = addr.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.connection.validate().map_err(ContendError::Config)?;

        if self.unique_ids == 0 {
            return Err(ContendError::Config("unique_ids must be > 0".into()));
        }

        if self.workers_per_id == 0 {
            return Err(ContendError::Config("workers_per_id must be > 0".into()));
        }

        Ok(())
    }

    /// The per-worker slice of this configuration.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            lock_on_read: self.select_for_update,
            think_time: self.think_time,
            tolerate_errors: self.tolerate_errors,
            use_savepoint: self.savepoint,
        }
    }
}

/// Immutable settings shared by every worker of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub lock_on_read: bool,
    pub think_time: Duration,
    pub tolerate_errors: bool,
    pub use_savepoint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let config = BenchConfig::default();
        assert_eq!(config.connection.max_connections, 10_000);
        assert_eq!(config.think_time, Duration::from_millis(25));
        assert_eq!(config.unique_ids, 1);
        assert_eq!(config.workers_per_id, 1);
        assert_eq!(config.metrics_addr, ":8181");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fan_out() {
        assert!(BenchConfig::default().unique_ids(0).validate().is_err());
        assert!(BenchConfig::default().workers_per_id(0).validate().is_err());
    }

    #[test]
    fn test_worker_config() {
        let config = BenchConfig::default()
            .think_time(Duration::from_millis(5))
            .select_for_update(true)
            .savepoint(true)
            .tolerate_errors(true);

        assert_eq!(config.worker_config(), WorkerConfig {
            lock_on_read: true,
            think_time: Duration::from_millis(5),
            tolerate_errors: true,
            use_savepoint: true,
        });
    }
}
