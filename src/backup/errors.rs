//! Top-level backup error type.
//!
//! Every failure either unwinds with the backup directory removed or, for
//! cancellation, leaves the half-written directory for retention to reap;
//! the variants keep those behaviors distinguishable for callers.

use thiserror::Error;

use crate::cancel::Cancelled;
use crate::database::DatabaseError;
use crate::filesystem::FilesystemError;
use crate::keeper::KeeperError;
use crate::metadata::MetadataError;
use crate::object_disk::ObjectDiskError;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors surfaced by backup creation.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Invalid flag combination, partition spec, or embedded-disk setup.
    /// Surfaced before any writes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Name collision, unknown data path, empty table set. Surfaced
    /// before any writes.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    ObjectDisk(ObjectDiskError),

    #[error(transparent)]
    Keeper(#[from] KeeperError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The backup was cancelled at a step boundary. The backup directory
    /// is intentionally left in place.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl BackupError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled(_))
    }
}

impl From<ObjectDiskError> for BackupError {
    fn from(err: ObjectDiskError) -> Self {
        match err {
            ObjectDiskError::Cancelled(cancelled) => BackupError::Cancelled(cancelled),
            other => BackupError::ObjectDisk(other),
        }
    }
}
