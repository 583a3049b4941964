//! Database adapter error types.

use thiserror::Error;

/// Result type for adapter operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors surfaced by the database adapter.
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    /// Connection to the server failed or was lost.
    #[error("can't connect to database: {0}")]
    Connection(String),

    /// A query failed. `code` carries the engine error code when the
    /// server reported one.
    #[error("query failed{}: {message}", fmt_code(code))]
    Query {
        code: Option<i32>,
        message: String,
    },

    /// Part columns differ across parts of the same table; freezing such
    /// a table would capture an unrestorable mix.
    #[error("parts columns mismatch for {table}: {details}")]
    PartsColumnsMismatch { table: String, details: String },
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (code: {})", code),
        None => String::new(),
    }
}

impl DatabaseError {
    pub fn query(message: impl Into<String>) -> Self {
        DatabaseError::Query {
            code: None,
            message: message.into(),
        }
    }

    pub fn query_with_code(code: i32, message: impl Into<String>) -> Self {
        DatabaseError::Query {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Engine error codes meaning the table vanished, was already
    /// unfrozen, or is unknown. Unfreeze failures with these codes are
    /// tolerated when `ignore_not_exists_error_during_freeze` is set.
    pub fn is_not_exists_during_freeze(&self) -> bool {
        matches!(
            self,
            DatabaseError::Query {
                code: Some(60 | 81 | 218),
                ..
            }
        )
    }
}
