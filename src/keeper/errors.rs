//! Coordination-service error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for coordination-service operations.
pub type KeeperResult<T> = Result<T, KeeperError>;

/// Errors from connecting to the coordination service or dumping a
/// subtree.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("can't connect to coordination service: {0}")]
    Connect(String),

    #[error("coordination service request failed for {path}: {details}")]
    Request { path: String, details: String },

    #[error("can't write dump file {path}: {source}")]
    DumpIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't serialize dump node {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
