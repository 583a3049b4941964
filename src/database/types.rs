//! Row types produced by the database adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A named storage volume discovered from the server at capture start.
///
/// The disk set is frozen for the duration of a backup; every path the
/// core writes is rooted at some disk's `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
    pub path: PathBuf,
    pub disk_type: DiskType,
}

/// Storage backend class of a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskType {
    Local,
    S3,
    AzureBlobStorage,
    Other,
}

impl DiskType {
    /// Parts on these disks are object-manifest files pointing at remote
    /// objects rather than the data itself.
    pub fn is_object_storage(&self) -> bool {
        matches!(self, DiskType::S3 | DiskType::AzureBlobStorage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiskType::Local => "local",
            DiskType::S3 => "s3",
            DiskType::AzureBlobStorage => "azure_blob_storage",
            DiskType::Other => "other",
        }
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a table participates in this backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupType {
    /// Schema plus data parts.
    #[default]
    Full,
    /// Schema only; no parts are captured.
    SchemaOnly,
    /// Excluded from the backup entirely.
    Skipped,
}

/// A table as enumerated by the adapter.
///
/// `skip` and `backup_type` are set by higher-level filters before the
/// table list reaches the core.
#[derive(Debug, Clone)]
pub struct Table {
    pub database: String,
    pub name: String,
    pub engine: String,
    pub create_table_query: String,
    pub total_bytes: u64,
    pub skip: bool,
    pub backup_type: BackupType,
}

impl Table {
    /// Only the MergeTree family plus the materialized external-database
    /// engines carry data parts of their own.
    pub fn has_data_parts(&self) -> bool {
        self.engine.ends_with("MergeTree")
            || self.engine == "MaterializedMySQL"
            || self.engine == "MaterializedPostgreSQL"
    }
}

/// Database + table name pair; keys the partition maps and the manifest
/// table list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    pub fn for_table(table: &Table) -> Self {
        Self::new(table.database.clone(), table.name.clone())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A database entry for the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub engine: String,
    pub query: String,
}

/// A user-defined function entry for the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub create_query: String,
}

/// An in-progress mutation, captured opaquely into table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub mutation_id: String,
    pub command: String,
}

/// One result row of the engine's BACKUP statement.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemBackupRow {
    pub status: String,
    pub compressed_size: u64,
}
