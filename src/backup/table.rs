//! Self-managed per-table capture.
//!
//! One table's pipeline: freeze under a fresh shadow UUID, walk the
//! shadow directory of every disk, move the selected parts into the
//! backup tree, export remote objects for object disks, then release the
//! shadow (UNFREEZE on engines that have it, direct removal on older
//! ones).
//!
//! The shadow UUID is per table, not per backup: a failure in one table
//! can be unfrozen without touching the others.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::common::{format_bytes, table_path_encode};
use crate::database::{Disk, Table, VERSION_UNFREEZE};
use crate::filesystem::{mkdir_all, move_shadow, FilesystemError, Owner};
use crate::metadata::Part;
use crate::object_disk::{export_part_objects, ObjectDiskError};
use crate::observability::{Logger, Severity};

use super::{BackupManager, BackupResult};

impl BackupManager {
    /// Captures one table's data parts into the backup tree.
    ///
    /// Returns `None` for engines that carry no data parts of their own
    /// (those get schema-only metadata); otherwise the per-disk part
    /// lists and byte sizes.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_table_to_backup(
        &self,
        backup_name: &str,
        shadow_uuid: &str,
        disks: &[Disk],
        table: &Table,
        partition_prefixes: &HashSet<String>,
        check_parts_columns: bool,
        owner: Option<Owner>,
        log: &Logger,
    ) -> BackupResult<Option<(BTreeMap<String, Vec<Part>>, BTreeMap<String, u64>)>> {
        if backup_name.is_empty() {
            return Err(super::BackupError::Configuration(
                "backup name is not defined".to_string(),
            ));
        }

        if !table.has_data_parts() {
            if table.engine != "MaterializedView" {
                log.log(
                    Severity::Warn,
                    "supports only schema backup",
                    &[("engine", &table.engine)],
                );
            }
            return Ok(None);
        }

        if check_parts_columns {
            self.adapter.check_parts_columns(table)?;
        }

        self.cancel.check()?;
        self.adapter.freeze_table(table, shadow_uuid)?;
        log.debug("frozen");

        let version = self.adapter.version()?;
        let encoded_table_path = Path::new(&table_path_encode(&table.database))
            .join(table_path_encode(&table.name));

        let mut real_size: BTreeMap<String, u64> = BTreeMap::new();
        let mut parts_by_disk: BTreeMap<String, Vec<Part>> = BTreeMap::new();

        for disk in disks {
            self.cancel.check()?;

            let shadow_path = disk.path.join("shadow").join(shadow_uuid);
            if !shadow_path.exists() {
                continue;
            }

            let backup_shadow_path = disk
                .path
                .join("backup")
                .join(backup_name)
                .join("shadow")
                .join(&encoded_table_path)
                .join(&disk.name);
            mkdir_all(&backup_shadow_path, owner)?;

            let (parts, moved_size) =
                move_shadow(&shadow_path, &backup_shadow_path, partition_prefixes)?;
            let mut disk_size = moved_size;
            log.log(Severity::Debug, "shadow moved", &[("disk", &disk.name)]);

            // The export condition mirrors the original behavior: s3
            // disks export even with zero moved parts, azure only with
            // at least one.
            let exports_objects = disk.disk_type == crate::database::DiskType::S3
                || (disk.disk_type == crate::database::DiskType::AzureBlobStorage
                    && !parts.is_empty());
            if exports_objects {
                disk_size += self.export_table_objects(backup_name, disk, &backup_shadow_path, log)?;
            }

            real_size.insert(disk.name.clone(), disk_size);
            parts_by_disk.insert(disk.name.clone(), parts);

            // UNFREEZE is unavailable below this version; drop the
            // shadow directory by hand instead.
            if version < VERSION_UNFREEZE {
                fs::remove_dir_all(&shadow_path)
                    .map_err(|e| FilesystemError::io(&shadow_path, e))?;
            }
        }

        if version > VERSION_UNFREEZE {
            if let Err(err) = self.adapter.unfreeze_table(table, shadow_uuid) {
                if err.is_not_exists_during_freeze()
                    && self.config.server.ignore_not_exists_error_during_freeze
                {
                    log.warn(&format!("can't unfreeze table: {}", err));
                } else {
                    return Err(err.into());
                }
            }
        }

        log.debug("done");
        Ok(Some((parts_by_disk, real_size)))
    }

    /// Exports the remote objects referenced by one table's moved parts
    /// on one object disk.
    fn export_table_objects(
        &self,
        backup_name: &str,
        disk: &Disk,
        backup_shadow_path: &Path,
        log: &Logger,
    ) -> BackupResult<u64> {
        let copier = self.remote.as_deref().ok_or_else(|| {
            ObjectDiskError::DestinationNotConfigured {
                disk: disk.name.clone(),
            }
        })?;
        let provider = self.credentials.as_deref().ok_or_else(|| {
            ObjectDiskError::Connect {
                disk: disk.name.clone(),
                details: "no credentials provider configured".to_string(),
            }
        })?;
        self.disk_connections.ensure(disk, provider)?;

        self.cancel.check()?;
        let started = Instant::now();
        let size = export_part_objects(
            backup_name,
            disk,
            backup_shadow_path,
            &self.disk_connections,
            copier,
            &self.cancel,
            log,
        )?;
        log.log(
            Severity::Info,
            "object_disk data exported",
            &[
                ("disk", &disk.name),
                ("size", &format_bytes(size)),
                ("duration", &format!("{:.3}s", started.elapsed().as_secs_f64())),
            ],
        );
        Ok(size)
    }
}
