//! Backup metadata model and writers.
//!
//! Two artifact kinds, both byte-for-byte reproducible JSON:
//!
//! - per-table metadata at `<backup>/metadata/<enc(db)>/<enc(table)>.json`,
//!   one-space indent, mode 0644;
//! - the top-level manifest at `<backup>/metadata.json`, tab indent, mode
//!   0640, written exactly once as the final act of a successful run.
//!
//! The manifest is the commit marker: its presence means the backup is
//! complete, its absence (with the directory present) means broken.
//! Both capture paths produce this same shape so a restorer never needs
//! to know which path ran; only the manifest `tags` field differs.

mod errors;

pub use errors::{MetadataError, MetadataResult};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::table_path_encode;
use crate::database::{DatabaseInfo, FunctionInfo, Mutation, TableRef};
use crate::filesystem::{chown_path, mkdir_all, Owner};
use crate::observability::Logger;

/// Manifest file name; doubles as the commit marker.
pub const META_FILE_NAME: &str = "metadata.json";

/// Manifest tag for the self-managed capture path.
pub const TAG_REGULAR: &str = "regular";

/// Manifest tag for the engine-managed capture path.
pub const TAG_EMBEDDED: &str = "embedded";

/// One immutable part directory, identified by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
}

/// Per-table metadata record, one file per captured table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table: String,
    pub database: String,
    pub query: String,
    pub total_bytes: u64,
    /// Captured bytes per disk (moved parts plus exported objects).
    pub size: BTreeMap<String, u64>,
    /// Captured parts per disk; enumeration order, not semantic order.
    pub parts: BTreeMap<String, Vec<Part>>,
    pub mutations: Vec<Mutation>,
    pub metadata_only: bool,
}

impl TableMetadata {
    /// Path of this table's metadata file under a backup's `metadata`
    /// directory.
    pub fn file_path(metadata_path: &Path, database: &str, table: &str) -> PathBuf {
        metadata_path
            .join(table_path_encode(database))
            .join(format!("{}.json", table_path_encode(table)))
    }

    /// Writes the record under `metadata_path`, returning the payload
    /// length in bytes (accumulated into the manifest's
    /// `metadata_size`).
    pub fn save(&self, metadata_path: &Path, owner: Option<Owner>) -> MetadataResult<u64> {
        let database_path = metadata_path.join(table_path_encode(&self.database));
        mkdir_all(&database_path, owner)?;

        let file_path =
            database_path.join(format!("{}.json", table_path_encode(&self.table)));
        let body = to_json_indented(self, b" ")?;
        fs::write(&file_path, &body).map_err(|e| MetadataError::io(&file_path, e))?;
        set_mode(&file_path, 0o644)?;
        if let Some(owner) = owner {
            chown_path(&file_path, owner)?;
        }
        Ok(body.len() as u64)
    }

    pub fn load(file_path: &Path) -> MetadataResult<Self> {
        let contents =
            fs::read(file_path).map_err(|e| MetadataError::io(file_path, e))?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

/// Top-level backup manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_name: String,
    /// Disk name -> root path, frozen at capture start.
    pub disks: BTreeMap<String, String>,
    /// Disk name -> storage type.
    pub disk_types: BTreeMap<String, String>,
    /// Version of this tool.
    pub version: String,
    pub creation_date: DateTime<Utc>,
    /// `regular` for the self-managed path, `embedded` for the
    /// engine-managed path.
    pub tags: String,
    pub server_version: String,
    pub data_size: u64,
    pub metadata_size: u64,
    pub rbac_size: u64,
    pub config_size: u64,
    pub tables: Vec<TableRef>,
    pub databases: Vec<DatabaseInfo>,
    pub functions: Vec<FunctionInfo>,
}

impl BackupManifest {
    /// Writes the manifest to `meta_file`. This is the commit point of a
    /// backup; the caller removes the backup directory when it fails.
    ///
    /// Ownership handoff failures are logged and swallowed: a complete
    /// backup with root-owned manifest is still a backup.
    pub fn save(&self, meta_file: &Path, owner: Option<Owner>, log: &Logger) -> MetadataResult<()> {
        let body = to_json_indented(self, b"\t")?;
        fs::write(meta_file, &body).map_err(|e| MetadataError::io(meta_file, e))?;
        set_mode(meta_file, 0o640)?;
        if let Some(owner) = owner {
            if chown_path(meta_file, owner).is_err() {
                log.log(
                    crate::observability::Severity::Warn,
                    "can't chown backup manifest",
                    &[("path", &meta_file.display().to_string())],
                );
            }
        }
        Ok(())
    }

    pub fn load(meta_file: &Path) -> MetadataResult<Self> {
        let contents = fs::read(meta_file).map_err(|e| MetadataError::io(meta_file, e))?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

fn to_json_indented<T: Serialize>(value: &T, indent: &'static [u8]) -> MetadataResult<Vec<u8>> {
    let mut body = Vec::with_capacity(1024);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
    value.serialize(&mut serializer)?;
    Ok(body)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> MetadataResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| MetadataError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> MetadataResult<()> {
    Ok(())
}
