use super::{Backend, BackendResult, Transaction};
use crate::connection::config::ConnectionConfig;
use crate::connection::pool::{ConnectionPool, PoolGuard, PoolStats};
use crate::core::{BackendError, ContendError, RecordId, Result};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

// `value` is read and written as i64.
const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS contend (
    id UUID NOT NULL PRIMARY KEY DEFAULT gen_random_uuid(),
    value INT8 NOT NULL DEFAULT 0
)";
const INSERT_RECORD: &str = "INSERT INTO contend (id) VALUES (DEFAULT) RETURNING id";
const SELECT_VALUE: &str = "SELECT value FROM contend WHERE id = $1";
const SELECT_VALUE_FOR_UPDATE: &str = "SELECT value FROM contend WHERE id = $1 FOR UPDATE";
const UPDATE_VALUE: &str = "UPDATE contend SET value = $1 WHERE id = $2";

/// Backend speaking the PostgreSQL wire protocol through a connection pool.
pub struct PgBackend {
    pool: ConnectionPool,
}

impl PgBackend {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            pool: ConnectionPool::new(config)?,
        })
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn bootstrap(&self) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;
        conn.connection()
            .client()
            .batch_execute(CREATE_TABLE)
            .await
            .map_err(|e| ContendError::backend("could not create table", e))?;
        info!(url = %self.pool.config().to_url(), "schema ready");
        Ok(())
    }

    async fn allocate_record(&self) -> BackendResult<RecordId> {
        let mut conn = self.pool.get_connection().await.map_err(pool_error)?;
        let row = conn.connection().client().query_one(INSERT_RECORD, &[]).await?;
        let id: Uuid = row.try_get(0)?;
        Ok(RecordId::new(id))
    }

    async fn begin(&self) -> BackendResult<Box<dyn Transaction>> {
        let mut conn = self.pool.get_connection().await.map_err(pool_error)?;
        conn.connection().begin().await?;
        Ok(Box::new(PgTransaction { conn }))
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(self.pool.stats())
    }
}

/// Keeps the SQLSTATE of a failed connect so the classifier still sees it.
fn pool_error(err: ContendError) -> BackendError {
    match err {
        ContendError::Backend { source, .. } => source,
        other => BackendError::uncoded(other.to_string()),
    }
}

/// A transaction pinned to one pooled connection.
///
/// If dropped while still open, the pool rolls it back before the
/// connection is handed out again.
struct PgTransaction {
    conn: PoolGuard,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn read_value(&mut self, id: RecordId, for_update: bool) -> BackendResult<i64> {
        let sql = if for_update { SELECT_VALUE_FOR_UPDATE } else { SELECT_VALUE };
        let row = self
            .conn
            .connection()
            .client()
            .query_one(sql, &[id.as_uuid()])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn write_value(&mut self, id: RecordId, value: i64) -> BackendResult<()> {
        self.conn
            .connection()
            .client()
            .execute(UPDATE_VALUE, &[&value, id.as_uuid()])
            .await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.batch(&format!("SAVEPOINT {name}")).await
    }

    async fn release_savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.batch(&format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT {name}")).await
    }

    async fn commit(&mut self) -> BackendResult<()> {
        self.conn.connection().commit().await
    }

    async fn rollback(&mut self) -> BackendResult<()> {
        self.conn.connection().rollback().await
    }
}

impl PgTransaction {
    async fn batch(&mut self, sql: &str) -> BackendResult<()> {
        self.conn.connection().client().batch_execute(sql).await?;
        Ok(())
    }
}
