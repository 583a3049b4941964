//! The adapter trait: the complete query surface the core consumes.

use std::path::PathBuf;

use super::errors::DatabaseResult;
use super::types::{
    Disk, DatabaseInfo, FunctionInfo, Mutation, SystemBackupRow, Table, TableRef,
};

/// Engine version at which the UNFREEZE statement becomes available.
/// Below it, frozen shadow directories are removed by hand.
pub(crate) const VERSION_UNFREEZE: u32 = 21_004_000;

/// Engine version at which `system.tables.total_bytes` becomes the
/// preferred size source over summing `system.parts`.
pub(crate) const VERSION_TOTAL_BYTES: u32 = 20_005_000;

/// Everything the backup core asks of the database server.
///
/// Implementations own their connection, authentication, and in-flight
/// query cancellation; the core checks its own cancellation token before
/// each call.
pub trait DatabaseAdapter {
    /// Databases matched by the table pattern, with engines and create
    /// statements.
    fn databases(&self, table_pattern: &str) -> DatabaseResult<Vec<DatabaseInfo>>;

    /// Tables matched by the pattern. Higher-level filters have already
    /// set `skip` and `backup_type` on each entry.
    fn tables(&self, table_pattern: &str) -> DatabaseResult<Vec<Table>>;

    /// User-defined functions for the manifest.
    fn user_defined_functions(&self) -> DatabaseResult<Vec<FunctionInfo>>;

    /// The disk set, without object-storage credential details.
    fn disks(&self) -> DatabaseResult<Vec<Disk>>;

    /// Numeric engine version, e.g. `21_008_003`.
    fn version(&self) -> DatabaseResult<u32>;

    /// Human-readable engine version string for the manifest.
    fn version_describe(&self) -> String;

    /// `ALTER TABLE ... FREEZE WITH NAME '<name>'`.
    fn freeze_table(&self, table: &Table, with_name: &str) -> DatabaseResult<()>;

    /// `ALTER TABLE ... UNFREEZE WITH NAME '<name>'`.
    fn unfreeze_table(&self, table: &Table, with_name: &str) -> DatabaseResult<()>;

    /// In-progress mutations for one table.
    fn in_progress_mutations(&self, database: &str, table: &str) -> DatabaseResult<Vec<Mutation>>;

    /// Part column uniformity check; an error aborts the table capture.
    fn check_parts_columns(&self, table: &Table) -> DatabaseResult<()>;

    /// Names of replicated user directories (`system.user_directories
    /// WHERE type='replicated'`).
    fn replicated_user_directories(&self) -> DatabaseResult<Vec<String>>;

    /// `sum(total_bytes)` over `system.tables` for the given tables
    /// (engines >= 20.5).
    fn tables_total_bytes(&self, tables: &[TableRef]) -> DatabaseResult<u64>;

    /// `sum(bytes_on_disk)` over active `system.parts` rows for the given
    /// tables (older engines).
    fn parts_bytes_on_disk(&self, tables: &[TableRef]) -> DatabaseResult<u64>;

    /// Executes an engine BACKUP statement and returns its result rows.
    fn execute_backup(&self, statement: &str) -> DatabaseResult<Vec<SystemBackupRow>>;

    /// Translates one partition expression (name or value tuple) to the
    /// partition id used in part directory names. `None` when the
    /// expression matches no partition of the table.
    fn resolve_partition_id(
        &self,
        database: &str,
        table: &str,
        expression: &str,
    ) -> DatabaseResult<Option<String>>;

    /// Local path of the server's access-management directory.
    fn access_management_path(&self, disks: &[Disk]) -> DatabaseResult<PathBuf>;
}
