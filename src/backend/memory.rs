//! In-process backend.
//!
//! Stores the `contend` table in a hash map and applies a transaction's
//! writes at commit. It performs no conflict detection of its own; conflicts
//! are produced on demand by queueing faults with [`MemoryBackend::fail_next`],
//! which makes it suitable for dry runs and for exercising the retry
//! machinery deterministically.

use super::{Backend, BackendResult, Transaction};
use crate::core::{BackendError, ContendedRecord, RecordId, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Allocate,
    Begin,
    Read,
    Write,
    Savepoint,
    ReleaseSavepoint,
    RollbackToSavepoint,
    Commit,
}

/// Counters describing what the backend has been asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub begun: u64,
    pub committed: u64,
    pub failed_commits: u64,
    pub rolled_back: u64,
    /// Transactions dropped without commit or rollback.
    pub abandoned: u64,
    /// Transactions currently open.
    pub open: u64,
    /// Most transactions ever open at the same time.
    pub max_open: u64,
    pub locked_reads: u64,
    pub savepoint_rollbacks: u64,
    /// Row updates made durable by a commit.
    pub committed_writes: u64,
}

#[derive(Default)]
struct Shared {
    rows: Mutex<HashMap<RecordId, i64>>,
    faults: Mutex<HashMap<Operation, VecDeque<BackendError>>>,
    stats: Mutex<MemoryStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn take_fault(&self, op: Operation) -> BackendResult<()> {
        match lock(&self.faults).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(&self, update: impl FnOnce(&mut MemoryStats)) {
        let mut stats = lock(&self.stats);
        stats.open = stats.open.saturating_sub(1);
        update(&mut stats);
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with SQLSTATE `code`.
    pub fn fail_next(&self, op: Operation, code: &str, times: usize) {
        let err = BackendError::with_code(code, format!("injected {op:?} failure"));
        self.inject(op, err, times);
    }

    /// Queue `times` copies of `err` for `op`, behind any already queued.
    pub fn inject(&self, op: Operation, err: BackendError, times: usize) {
        let mut faults = lock(&self.shared.faults);
        let queue = faults.entry(op).or_default();
        queue.extend(std::iter::repeat_n(err, times));
    }

    /// Number of queued faults not yet consumed.
    pub fn pending_faults(&self) -> usize {
        lock(&self.shared.faults).values().map(VecDeque::len).sum()
    }

    pub fn stats(&self) -> MemoryStats {
        *lock(&self.shared.stats)
    }

    /// Committed value of a record.
    pub fn value(&self, id: RecordId) -> Option<i64> {
        lock(&self.shared.rows).get(&id).copied()
    }

    /// All committed records, in identity order.
    pub fn records(&self) -> Vec<ContendedRecord> {
        let mut records: Vec<_> = lock(&self.shared.rows)
            .iter()
            .map(|(&id, &value)| ContendedRecord { id, value })
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    async fn allocate_record(&self) -> BackendResult<RecordId> {
        self.shared.take_fault(Operation::Allocate)?;
        let id = RecordId::new(Uuid::new_v4());
        lock(&self.shared.rows).insert(id, 0);
        Ok(id)
    }

    async fn begin(&self) -> BackendResult<Box<dyn Transaction>> {
        self.shared.take_fault(Operation::Begin)?;

        {
            let mut stats = lock(&self.shared.stats);
            stats.begun += 1;
            stats.open += 1;
            stats.max_open = stats.max_open.max(stats.open);
        }

        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            writes: HashMap::new(),
            savepoints: Vec::new(),
            open: true,
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    writes: HashMap<RecordId, i64>,
    savepoints: Vec<(String, HashMap<RecordId, i64>)>,
    open: bool,
}

impl MemoryTransaction {
    fn check_open(&self) -> BackendResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(BackendError::uncoded("transaction is not open"))
        }
    }

    fn savepoint_index(&self, name: &str) -> BackendResult<usize> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| BackendError::with_code("3B001", format!("savepoint \"{name}\" does not exist")))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn read_value(&mut self, id: RecordId, for_update: bool) -> BackendResult<i64> {
        self.check_open()?;
        self.shared.take_fault(Operation::Read)?;
        if for_update {
            lock(&self.shared.stats).locked_reads += 1;
        }

        if let Some(value) = self.writes.get(&id) {
            return Ok(*value);
        }
        lock(&self.shared.rows)
            .get(&id)
            .copied()
            .ok_or_else(|| BackendError::uncoded("no rows in result set"))
    }

    async fn write_value(&mut self, id: RecordId, value: i64) -> BackendResult<()> {
        self.check_open()?;
        self.shared.take_fault(Operation::Write)?;
        if !lock(&self.shared.rows).contains_key(&id) {
            return Err(BackendError::uncoded(format!("record {id} does not exist")));
        }
        self.writes.insert(id, value);
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.check_open()?;
        self.shared.take_fault(Operation::Savepoint)?;
        self.savepoints.push((name.to_string(), self.writes.clone()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.check_open()?;
        self.shared.take_fault(Operation::ReleaseSavepoint)?;
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> BackendResult<()> {
        self.check_open()?;
        self.shared.take_fault(Operation::RollbackToSavepoint)?;
        let index = self.savepoint_index(name)?;
        self.writes = self.savepoints[index].1.clone();
        self.savepoints.truncate(index + 1);
        lock(&self.shared.stats).savepoint_rollbacks += 1;
        Ok(())
    }

    async fn commit(&mut self) -> BackendResult<()> {
        self.check_open()?;
        self.open = false;

        if let Err(err) = self.shared.take_fault(Operation::Commit) {
            self.shared.finish(|stats| stats.failed_commits += 1);
            return Err(err);
        }

        let writes = std::mem::take(&mut self.writes);
        let applied = writes.len() as u64;
        lock(&self.shared.rows).extend(writes);
        self.shared.finish(|stats| {
            stats.committed += 1;
            stats.committed_writes += applied;
        });
        Ok(())
    }

    async fn rollback(&mut self) -> BackendResult<()> {
        self.check_open()?;
        self.open = false;
        self.writes.clear();
        self.shared.finish(|stats| stats.rolled_back += 1);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.open {
            self.shared.finish(|stats| stats.abandoned += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        assert_eq!(backend.value(id), Some(0));

        let mut tx = backend.begin().await.unwrap();
        tx.write_value(id, 42).await.unwrap();
        assert_eq!(tx.read_value(id, false).await.unwrap(), 42);
        assert_eq!(backend.value(id), Some(0));
        tx.commit().await.unwrap();

        assert_eq!(backend.value(id), Some(42));
        let stats = backend.stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.committed_writes, 1);
        assert_eq!(stats.open, 0);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        tx.write_value(id, 7).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(tx.commit().await.is_err());

        let mut tx = backend.begin().await.unwrap();
        tx.write_value(id, 8).await.unwrap();
        drop(tx);

        assert_eq!(backend.value(id), Some(0));
        let stats = backend.stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.open, 0);
        assert_eq!(stats.max_open, 1);
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint_restores_writes() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        tx.savepoint("sp").await.unwrap();
        tx.write_value(id, 1).await.unwrap();
        tx.rollback_to_savepoint("sp").await.unwrap();
        assert_eq!(tx.read_value(id, false).await.unwrap(), 0);

        tx.write_value(id, 2).await.unwrap();
        tx.release_savepoint("sp").await.unwrap();
        assert!(tx.rollback_to_savepoint("sp").await.is_err());
        tx.commit().await.unwrap();

        assert_eq!(backend.value(id), Some(2));
        assert_eq!(backend.stats().savepoint_rollbacks, 1);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        backend.fail_next(Operation::Read, "40001", 2);
        assert_eq!(backend.pending_faults(), 2);

        let mut tx = backend.begin().await.unwrap();
        for _ in 0..2 {
            let err = tx.read_value(id, true).await.unwrap_err();
            assert_eq!(err.code(), Some("40001"));
        }
        assert_eq!(tx.read_value(id, true).await.unwrap(), 0);
        assert_eq!(backend.pending_faults(), 0);
        assert_eq!(backend.stats().locked_reads, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_discards_writes() {
        let backend = MemoryBackend::new();
        let id = backend.allocate_record().await.unwrap();
        backend.fail_next(Operation::Commit, "40001", 1);

        let mut tx = backend.begin().await.unwrap();
        tx.write_value(id, 5).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert_eq!(backend.value(id), Some(0));
        let stats = backend.stats();
        assert_eq!(stats.failed_commits, 1);
        assert_eq!(stats.open, 0);
    }
}
