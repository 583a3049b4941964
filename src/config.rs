//! Configuration model consumed by the backup core.
//!
//! The core never loads configuration itself; callers deserialize these
//! structs from whatever source they use and hand them in. Defaults match
//! a single-node database with one local `default` disk.

use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration for the backup core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub server: ServerConfig,
    pub keeper: KeeperConfig,
}

/// Behavior knobs that are not tied to the database connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Permit a backup that captures no tables (self-managed path only;
    /// the engine-managed path always rejects an empty set).
    pub allow_empty_backups: bool,
    /// Retention: number of complete local backups to keep after a
    /// successful create. Zero or negative disables retention cleanup.
    pub backups_to_keep_local: i64,
    /// Shard-operation mode for multi-shard clusters. Anything but
    /// `None` is incompatible with engine-managed backups.
    pub sharded_operation_mode: ShardedOperationMode,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            allow_empty_backups: false,
            backups_to_keep_local: 0,
            sharded_operation_mode: ShardedOperationMode::None,
        }
    }
}

/// How table capture is distributed across shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardedOperationMode {
    /// Single-shard operation: every table is captured by this node.
    None,
    /// Tables are distributed across shards by table name.
    Table,
    /// Tables are distributed across shards by database name.
    Database,
    /// Only the first replica of each shard captures data.
    FirstReplica,
}

impl ShardedOperationMode {
    /// True when table capture is split across shards.
    pub fn does_shard(&self) -> bool {
        !matches!(self, ShardedOperationMode::None)
    }
}

/// Database-server-specific options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding the server configuration files captured by a
    /// configs backup.
    pub config_dir: PathBuf,
    /// Capture in-progress mutations into table metadata on data runs.
    pub backup_mutations: bool,
    /// Verify part column uniformity before freezing each table.
    pub check_parts_columns: bool,
    /// Tolerate "table vanished" / "already unfrozen" / "unknown table"
    /// engine errors (codes 60, 81, 218) when unfreezing.
    pub ignore_not_exists_error_during_freeze: bool,
    /// Delegate capture to the engine's own BACKUP statement.
    pub use_embedded_backup_restore: bool,
    /// Disk the engine writes embedded backups to. Must exist in the
    /// discovered disk set when the embedded path is used.
    pub embedded_backup_disk: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/server"),
            backup_mutations: true,
            check_parts_columns: true,
            ignore_not_exists_error_during_freeze: true,
            use_embedded_backup_restore: false,
            embedded_backup_disk: String::new(),
        }
    }
}

/// Coordination-service options for replicated access capture.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Root node under which replicated access definitions live.
    pub access_root: String,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            access_root: "/clickhouse/access".to_string(),
        }
    }
}
