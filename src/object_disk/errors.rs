//! Object-disk error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::cancel::Cancelled;

/// Result type for object-disk operations.
pub type ObjectDiskResult<T> = Result<T, ObjectDiskError>;

/// Errors from part-object manifest parsing and remote copies.
#[derive(Debug, Error)]
pub enum ObjectDiskError {
    #[error("can't read part object manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed part object manifest {path}: {details}")]
    MalformedManifest { path: PathBuf, details: String },

    /// The disk has no registered remote connection; the whole table
    /// capture fails.
    #[error("disk {disk} has no registered object storage connection")]
    ConnectionNotRegistered { disk: String },

    /// Resolving per-disk credentials failed.
    #[error("can't connect object storage for disk {disk}: {details}")]
    Connect { disk: String, details: String },

    #[error("remote copy {src_bucket}/{src_key} -> {dst_key} failed: {details}")]
    Copy {
        src_bucket: String,
        src_key: String,
        dst_key: String,
        details: String,
    },

    /// No backup destination is configured although an object disk holds
    /// parts to export.
    #[error("object disk {disk} requires a configured backup destination")]
    DestinationNotConfigured { disk: String },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
