//! colbackup - backup-creation core for columnar analytical databases
//!
//! Captures a consistent, restorable snapshot of a selected table set —
//! schemas, immutable data parts, in-progress mutations, access-control
//! entries, and configuration files — into a well-defined on-disk backup
//! layout across one or more named storage disks.
//!
//! Two capture paths produce one metadata shape:
//!
//! - **self-managed**: drive the database's freeze mechanism, move the
//!   frozen part directories into the backup tree, export remote objects
//!   for object-storage disks, unfreeze;
//! - **engine-managed (embedded)**: delegate the physical capture to the
//!   engine's own BACKUP statement and synthesize the same metadata from
//!   its output layout.
//!
//! The top-level `metadata.json` manifest is the commit marker: its
//! presence means the backup is complete; its absence with the directory
//! present means broken. On any failure the backup directory is removed
//! in full before the error returns (cancellation excepted: the
//! directory is left for retention).
//!
//! The database client, the coordination-service session, and the remote
//! object-store clients are external collaborators, represented by the
//! traits in [`database`], [`keeper`], and [`object_disk`].

pub mod backup;
pub mod cancel;
pub mod common;
pub mod config;
pub mod database;
pub mod filesystem;
pub mod keeper;
pub mod metadata;
pub mod object_disk;
pub mod observability;
pub mod partition;

pub use backup::{BackupError, BackupManager, BackupResult, CreateOptions, LocalBackup};
pub use cancel::CancelToken;
pub use config::Config;

/// Version of this tool, recorded in every backup manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
