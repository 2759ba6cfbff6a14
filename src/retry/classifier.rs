use crate::core::{ContendError, Result};
use crate::metrics::Observer;
use std::sync::Arc;

/// SQLSTATE 40001: the transaction lost a conflict and must be restarted.
pub const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE 40003: the outcome of the statement is not known.
pub const STATEMENT_COMPLETION_UNKNOWN: &str = "40003";
/// SQLSTATE 08003
pub const CONNECTION_DOES_NOT_EXIST: &str = "08003";
/// SQLSTATE 08006
pub const CONNECTION_FAILURE: &str = "08006";

/// Codes that are retried without limit.
pub const TRANSIENT_SQL_STATES: [&str; 4] = [
    SERIALIZATION_FAILURE,
    STATEMENT_COMPLETION_UNKNOWN,
    CONNECTION_DOES_NOT_EXIST,
    CONNECTION_FAILURE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No error.
    None,
    /// Retry the unit of work.
    TransientConflict,
    /// Give up and surface the error.
    Fatal,
}

pub fn is_transient(sql_state: &str) -> bool {
    TRANSIENT_SQL_STATES.contains(&sql_state)
}

/// Decides whether an error is worth retrying.
///
/// Every coded error is counted on the observer, including the fatal ones,
/// so the full error distribution is visible and not only what was retried.
#[derive(Clone)]
pub struct ErrorClassifier {
    observer: Arc<dyn Observer>,
}

impl ErrorClassifier {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    pub fn classify(&self, err: Option<&ContendError>) -> ErrorClass {
        let Some(err) = err else {
            return ErrorClass::None;
        };

        match err.sql_state() {
            Some(code) => {
                self.observer.record_error_code(code);
                if is_transient(code) {
                    ErrorClass::TransientConflict
                } else {
                    ErrorClass::Fatal
                }
            }
            None => ErrorClass::Fatal,
        }
    }

    pub fn classify_result<T>(&self, result: &Result<T>) -> ErrorClass {
        self.classify(result.as_ref().err())
    }
}
