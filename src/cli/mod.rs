mod duration;

pub use duration::parse_duration;

use clap::Parser;
use contend::connection::config::DEFAULT_URL;
use contend::{BenchConfig, ConnectionConfig, ContendError, Result};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "contend")]
#[command(about = "Hammer a few rows with concurrent read-modify-write transactions")]
pub struct Args {
    /// database connection string
    #[arg(long, default_value = DEFAULT_URL)]
    pub conn: String,

    /// the maximum number of open database connections
    #[arg(long, alias = "maxConns", default_value_t = 10_000)]
    pub max_conns: usize,

    /// a bind string for the metrics server
    #[arg(long, default_value = ":8181")]
    pub http: String,

    /// the amount of time for workers to sleep during transaction
    #[arg(long, alias = "thinkTime", default_value = "25ms", value_parser = parse_duration)]
    pub think_time: Duration,

    /// keep going after non-retryable errors
    #[arg(long, alias = "tolerateErrors")]
    pub tolerate_errors: bool,

    /// the number of unique keys to update
    #[arg(long, alias = "uniqueIds", default_value_t = 1)]
    pub unique_ids: usize,

    /// read with SELECT FOR UPDATE
    #[arg(long, alias = "selectForUpdate")]
    pub select_for_update: bool,

    /// retry inside the transaction through a savepoint
    #[arg(long, alias = "savePoint")]
    pub save_point: bool,

    /// the number of workers trying to update each id
    #[arg(long, alias = "workersPerId", default_value_t = 1)]
    pub workers_per_id: usize,
}

impl Args {
    pub fn into_config(self) -> Result<BenchConfig> {
        let connection = ConnectionConfig::from_url(&self.conn)
            .map_err(ContendError::Config)?
            .max_connections(self.max_conns);

        let config = BenchConfig::default()
            .connection(connection)
            .think_time(self.think_time)
            .tolerate_errors(self.tolerate_errors)
            .unique_ids(self.unique_ids)
            .workers_per_id(self.workers_per_id)
            .select_for_update(self.select_for_update)
            .savepoint(self.save_point)
            .metrics_addr(&self.http);
        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contend::connection::config::BackendKind;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("contend").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.connection.url, DEFAULT_URL);
        assert_eq!(config.connection.max_connections, 10_000);
        assert_eq!(config.think_time, Duration::from_millis(25));
        assert_eq!(config.metrics_addr, ":8181");
        assert_eq!(config.unique_ids, 1);
        assert_eq!(config.workers_per_id, 1);
        assert!(!config.tolerate_errors);
        assert!(!config.select_for_update);
        assert!(!config.savepoint);
    }

    #[test]
    fn test_flags_and_aliases() {
        let config = parse(&[
            "--conn",
            "memory://",
            "--maxConns",
            "4",
            "--think-time",
            "1m30s",
            "--tolerateErrors",
            "--unique-ids",
            "3",
            "--selectForUpdate",
            "--save-point",
            "--workersPerId",
            "8",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.connection.kind, BackendKind::Memory);
        assert_eq!(config.connection.max_connections, 4);
        assert_eq!(config.think_time, Duration::from_secs(90));
        assert!(config.tolerate_errors);
        assert_eq!(config.unique_ids, 3);
        assert!(config.select_for_update);
        assert!(config.savepoint);
        assert_eq!(config.workers_per_id, 8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(parse(&["--workers-per-id", "0"]).into_config().is_err());
        assert!(parse(&["--max-conns", "0"]).into_config().is_err());
        let too_many = usize::MAX.to_string();
        assert!(parse(&["--max-conns", too_many.as_str()]).into_config().is_err());
        assert!(parse(&["--conn", "mysql://localhost"]).into_config().is_err());
        assert!(Args::try_parse_from(["contend", "--think-time", "25"]).is_err());
    }
}
