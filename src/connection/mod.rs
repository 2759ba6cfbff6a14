pub mod config;
pub mod pool;

use crate::core::{BackendError, ContendError, Result};
use config::ConnectionConfig;
use std::time::{Duration, Instant};
use tokio_postgres::{Client, NoTls};
use tracing::debug;

type BackendResult<T> = std::result::Result<T, BackendError>;

/// Database connection handle
///
/// Owns one `tokio_postgres` client and tracks whether an explicit
/// transaction is open on it.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Wire protocol client
    client: Client,
    /// Connection state
    state: ConnectionState,
    created_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
}

impl Connection {
    /// Open a new connection and spawn its I/O driver
    pub(crate) async fn connect(id: u64, config: &ConnectionConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.url, NoTls)
            .await
            .map_err(|e| ContendError::backend(format!("could not connect to {}", config.to_url()), e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(connection_id = id, error = %e, "connection closed with error");
            }
        });

        Ok(Self {
            id,
            client,
            state: ConnectionState::Active,
            created_at: Instant::now(),
        })
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Underlying client, for issuing statements
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Begin a new transaction
    pub async fn begin(&mut self) -> BackendResult<()> {
        if self.state == ConnectionState::InTransaction {
            return Err(BackendError::uncoded("Transaction already active"));
        }

        self.client.batch_execute("BEGIN").await?;
        self.state = ConnectionState::InTransaction;
        Ok(())
    }

    /// Commit the current transaction
    ///
    /// The transaction is finished whether or not the server accepted the
    /// commit.
    pub async fn commit(&mut self) -> BackendResult<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(BackendError::uncoded("No active transaction"));
        }

        let result = self.client.batch_execute("COMMIT").await;
        self.state = ConnectionState::Active;
        result.map_err(BackendError::from)
    }

    /// Rollback the current transaction
    pub async fn rollback(&mut self) -> BackendResult<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(BackendError::uncoded("No active transaction"));
        }

        let result = self.client.batch_execute("ROLLBACK").await;
        self.state = ConnectionState::Active;
        result.map_err(BackendError::from)
    }

    /// Check if connection is in a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    /// Check if the server side of the connection is gone
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
