use std::fmt;
use uuid::Uuid;

/// Identity of a contended row. Assigned once by the backend and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the `contend` table as seen by a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContendedRecord {
    pub id: RecordId,
    pub value: i64,
}
