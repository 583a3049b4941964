//! Engine-managed capture: one BACKUP statement, metadata synthesized
//! from the layout the engine produces.
//!
//! The engine freezes and collects parts itself; afterwards the core
//! reads `<embedded-disk>/<name>/data/...` back to produce the same
//! metadata shape as the self-managed path, so a restorer never cares
//! which path ran.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::common::table_path_encode;
use crate::database::{Disk, Table, TableRef, VERSION_TOTAL_BYTES};
use crate::database::{DatabaseInfo, FunctionInfo};
use crate::filesystem::{self, FilesystemError};
use crate::metadata::{Part, TableMetadata, META_FILE_NAME, TAG_EMBEDDED};
use crate::observability::Logger;
use crate::partition::PartitionSelection;

use super::{BackupError, BackupManager, BackupResult, CreateOptions};

/// Statement statuses that mean the engine finished the backup.
const BACKUP_OK_STATUSES: [&str; 2] = ["BACKUP_COMPLETE", "BACKUP_CREATED"];

impl BackupManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_backup_embedded(
        &self,
        backup_name: &str,
        options: &CreateOptions,
        selection: &PartitionSelection,
        tables: &[Table],
        all_databases: &[DatabaseInfo],
        all_functions: &[FunctionInfo],
        disks: &[Disk],
        log: &Logger,
    ) -> BackupResult<()> {
        if self.config.general.sharded_operation_mode.does_shard() {
            return Err(BackupError::Configuration(
                "cannot perform embedded backup: sharded operation is not supported".to_string(),
            ));
        }
        let embedded_disk_name = &self.config.server.embedded_backup_disk;
        let embedded_disk = disks
            .iter()
            .find(|disk| &disk.name == embedded_disk_name)
            .ok_or_else(|| {
                BackupError::Configuration(format!(
                    "backup disk `{}` not exists in the discovered disk set",
                    embedded_disk_name
                ))
            })?;
        if options.rbac || options.rbac_only || options.configs || options.configs_only {
            return Err(BackupError::Configuration(
                "embedded backups do not support --rbac and --configs".to_string(),
            ));
        }
        let live: Vec<&Table> = tables.iter().filter(|t| !t.skip).collect();
        if live.is_empty() {
            return Err(BackupError::Precondition(format!(
                "embedded backups do not allow empty table sets, check your tables pattern {}",
                options.table_pattern
            )));
        }

        let statement = build_backup_statement(
            &live,
            selection,
            embedded_disk_name,
            backup_name,
            options.schema_only,
        );
        self.cancel.check()?;
        let rows = self.adapter.execute_backup(&statement)?;
        if rows.len() != 1 || !BACKUP_OK_STATUSES.contains(&rows[0].status.as_str()) {
            return Err(BackupError::Database(
                crate::database::DatabaseError::query(format!(
                    "backup statement returned wrong results: {:?}",
                    rows.iter().map(|r| r.status.as_str()).collect::<Vec<_>>()
                )),
            ));
        }

        let data_size: u64 = if options.schema_only {
            0
        } else if rows[0].compressed_size != 0 {
            rows[0].compressed_size
        } else {
            // The engine did not report a size; sum it from the system
            // tables over exactly the selected set.
            let refs: Vec<TableRef> = live.iter().map(|t| TableRef::for_table(t)).collect();
            if self.adapter.version()? >= VERSION_TOTAL_BYTES {
                self.adapter.tables_total_bytes(&refs)?
            } else {
                self.adapter.parts_bytes_on_disk(&refs)?
            }
        };

        log.debug("calculate parts list from embedded backup disk");
        let backup_path = embedded_disk.path.join(backup_name);
        let owner = filesystem::resolve_owner(&embedded_disk.path);
        let mut metadata_size: u64 = 0;
        let mut table_metas: Vec<TableRef> = Vec::new();
        for table in &live {
            self.cancel.check()?;
            let table_ref = TableRef::for_table(table);
            let prefixes = selection.prefixes_for(&table_ref);
            let parts = match parts_from_backup_disk(
                &backup_path,
                embedded_disk_name,
                table,
                &prefixes,
            ) {
                Ok(parts) => parts,
                Err(err) => {
                    self.cleanup_backup(backup_name, disks, log);
                    return Err(err);
                }
            };

            let mut size = BTreeMap::new();
            size.insert(embedded_disk_name.clone(), 0_u64);
            let record = TableMetadata {
                table: table.name.clone(),
                database: table.database.clone(),
                query: table.create_table_query.clone(),
                total_bytes: table.total_bytes,
                size,
                parts,
                mutations: Vec::new(),
                metadata_only: options.schema_only,
            };
            match record.save(&backup_path.join("metadata"), owner) {
                Ok(written) => metadata_size += written,
                Err(err) => {
                    self.cleanup_backup(backup_name, disks, log);
                    return Err(err.into());
                }
            }
            table_metas.push(table_ref);
        }

        self.write_backup_manifest(
            &backup_path.join(META_FILE_NAME),
            backup_name,
            TAG_EMBEDDED,
            disks,
            data_size,
            metadata_size,
            0,
            0,
            table_metas,
            all_databases,
            all_functions,
            owner,
            log,
        )?;
        log.info("done create_embedded");
        Ok(())
    }
}

/// Builds the engine statement:
/// `BACKUP TABLE `d`.`t` [PARTITIONS 'p1','p2'], TABLE ... TO
/// Disk('<disk>','<name>')`, with the schema-only settings appended when
/// requested.
fn build_backup_statement(
    tables: &[&Table],
    selection: &PartitionSelection,
    embedded_disk: &str,
    backup_name: &str,
    schema_only: bool,
) -> String {
    let mut tables_sql = String::new();
    for (i, table) in tables.iter().enumerate() {
        tables_sql.push_str(&format!("TABLE `{}`.`{}`", table.database, table.name));
        let names = selection.names_for(&TableRef::for_table(table));
        if !names.is_empty() {
            let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
            tables_sql.push_str(&format!(" PARTITIONS {}", quoted.join(",")));
        }
        if i + 1 < tables.len() {
            tables_sql.push_str(", ");
        }
    }
    let mut statement = format!(
        "BACKUP {} TO Disk('{}','{}')",
        tables_sql, embedded_disk, backup_name
    );
    if schema_only {
        statement.push_str(
            " SETTINGS structure_only=1, show_table_uuid_in_table_create_query_if_not_nil=1",
        );
    }
    statement
}

/// Reads the part list the engine produced for one table, applying the
/// same partition-prefix filter as the self-managed path.
///
/// A missing table directory yields an empty map (the engine wrote no
/// parts); an existing one always yields an entry for the embedded disk,
/// possibly empty.
fn parts_from_backup_disk(
    backup_path: &Path,
    embedded_disk: &str,
    table: &Table,
    prefixes: &std::collections::HashSet<String>,
) -> BackupResult<BTreeMap<String, Vec<Part>>> {
    let mut parts: BTreeMap<String, Vec<Part>> = BTreeMap::new();
    let table_data_path = backup_path
        .join("data")
        .join(table_path_encode(&table.database))
        .join(table_path_encode(&table.name));

    let entries = match fs::read_dir(&table_data_path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(parts),
        Err(err) => return Err(FilesystemError::io(&table_data_path, err).into()),
    };

    let mut list: Vec<Part> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::io(&table_data_path, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if filesystem::part_matches(&name, prefixes) {
            list.push(Part { name });
        }
    }
    parts.insert(embedded_disk.to_string(), list);
    Ok(parts)
}
