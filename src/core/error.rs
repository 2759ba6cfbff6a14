use std::fmt;
use thiserror::Error;

/// Backend-neutral error carrying the SQLSTATE reported by the server, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    code: Option<String>,
    message: String,
}

impl BackendError {
    /// Error reported with a SQLSTATE code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error without a SQLSTATE (I/O, protocol, client-side failures).
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<tokio_postgres::Error> for BackendError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.code() {
            Some(state) => Self::with_code(state.code(), err.to_string()),
            None => Self::uncoded(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ContendError {
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BackendError,
    },

    #[error("context canceled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContendError {
    /// Wraps a backend failure with the step that produced it.
    pub fn backend(context: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// SQLSTATE of the underlying backend error, if one was reported.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Backend { source, .. } => source.code(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ContendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::with_code("40001", "restart transaction");
        assert_eq!(err.to_string(), "restart transaction (SQLSTATE 40001)");
        assert_eq!(BackendError::uncoded("broken pipe").to_string(), "broken pipe");
    }

    #[test]
    fn test_sql_state_passes_through_context() {
        let err = ContendError::backend("updating abc", BackendError::with_code("08006", "gone"));
        assert_eq!(err.sql_state(), Some("08006"));
        assert_eq!(err.to_string(), "updating abc: gone (SQLSTATE 08006)");

        assert_eq!(ContendError::Cancelled.sql_state(), None);
        assert!(ContendError::Cancelled.is_cancelled());
    }
}
