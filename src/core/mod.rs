pub mod error;
pub mod types;

pub use error::{BackendError, ContendError, Result};
pub use types::{ContendedRecord, RecordId};
