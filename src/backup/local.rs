//! Local backup inventory: listing, removal, retention, and stray-shadow
//! cleanup.
//!
//! A backup directory without `metadata.json` is broken by definition —
//! either a create died mid-flight or it was cancelled. Broken backups
//! are listed as such and are fair game for retention.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::database::Disk;
use crate::filesystem::FilesystemError;
use crate::metadata::{BackupManifest, META_FILE_NAME};
use crate::observability::{Logger, Severity};

use super::{default_disk_path, BackupManager, BackupResult};

/// One backup found on the default disk.
#[derive(Debug)]
pub struct LocalBackup {
    pub name: String,
    /// Parsed manifest; `None` for broken backups.
    pub manifest: Option<BackupManifest>,
    /// Why the backup is considered broken, when it is.
    pub broken: Option<String>,
    /// Manifest creation date, or directory mtime for broken backups.
    pub created: DateTime<Utc>,
}

impl LocalBackup {
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }
}

impl BackupManager {
    /// Lists the backups under `<default>/backup`, oldest first.
    pub fn list_local_backups(&self, disks: &[Disk]) -> BackupResult<Vec<LocalBackup>> {
        let backup_root = default_disk_path(disks)?.join("backup");
        let mut backups: Vec<LocalBackup> = Vec::new();

        let entries = match fs::read_dir(&backup_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(backups),
            Err(err) => return Err(FilesystemError::io(&backup_root, err).into()),
        };

        for entry in entries {
            let entry = entry.map_err(|e| FilesystemError::io(&backup_root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            backups.push(read_local_backup(&path, name)?);
        }

        backups.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(backups)
    }

    /// Removes one backup from every disk: the per-disk `backup/<name>`
    /// trees and, when the embedded path is configured, the embedded
    /// layout on its disk.
    pub fn remove_backup_local(&self, backup_name: &str, disks: &[Disk]) -> BackupResult<()> {
        for disk in disks {
            remove_dir_if_exists(&disk.path.join("backup").join(backup_name))?;
            if self.config.server.use_embedded_backup_restore
                && disk.name == self.config.server.embedded_backup_disk
            {
                remove_dir_if_exists(&disk.path.join(backup_name))?;
            }
        }
        Ok(())
    }

    /// Retention: keeps the newest `backups_to_keep_local` complete
    /// backups and removes the rest. Broken backups never count against
    /// the keep budget and are always removed. Disabled when the knob is
    /// zero or negative.
    pub fn remove_old_backups_local(&self, disks: &[Disk], log: &Logger) -> BackupResult<()> {
        let keep = self.config.general.backups_to_keep_local;
        if keep <= 0 {
            return Ok(());
        }
        let backups = self.list_local_backups(disks)?;
        let complete_count = backups.iter().filter(|b| !b.is_broken()).count();
        let mut complete_to_remove = complete_count.saturating_sub(keep as usize);

        // Oldest first; complete backups beyond the keep budget come
        // before every kept one.
        for backup in &backups {
            if !backup.is_broken() {
                if complete_to_remove == 0 {
                    continue;
                }
                complete_to_remove -= 1;
            }
            log.log(
                Severity::Info,
                "remove old backup",
                &[
                    ("backup", &backup.name),
                    ("broken", if backup.is_broken() { "true" } else { "false" }),
                ],
            );
            self.remove_backup_local(&backup.name, disks)?;
        }
        Ok(())
    }

    /// Removes stray shadow directories on every disk. Invoked after a
    /// failed table capture so leaked freeze output does not pile up.
    pub fn clean_shadow(&self, disks: &[Disk], log: &Logger) -> BackupResult<()> {
        for disk in disks {
            let shadow_root = disk.path.join("shadow");
            let entries = match fs::read_dir(&shadow_root) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(FilesystemError::io(&shadow_root, err).into()),
            };
            for entry in entries {
                let entry = entry.map_err(|e| FilesystemError::io(&shadow_root, e))?;
                let path = entry.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path).map_err(|e| FilesystemError::io(&path, e))?;
                }
            }
            log.log(Severity::Debug, "shadow cleaned", &[("disk", &disk.name)]);
        }
        Ok(())
    }
}

fn read_local_backup(path: &Path, name: String) -> BackupResult<LocalBackup> {
    let meta_file = path.join(META_FILE_NAME);
    match BackupManifest::load(&meta_file) {
        Ok(manifest) => Ok(LocalBackup {
            name,
            created: manifest.creation_date,
            manifest: Some(manifest),
            broken: None,
        }),
        Err(err) => {
            let created = fs::metadata(path)
                .and_then(|meta| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let broken = if meta_file.exists() {
                format!("broken metadata.json: {}", err)
            } else {
                "broken (no metadata.json)".to_string()
            };
            Ok(LocalBackup {
                name,
                manifest: None,
                broken: Some(broken),
                created,
            })
        }
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), FilesystemError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(FilesystemError::io(path, err)),
    }
}
