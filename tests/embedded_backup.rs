//! Engine-managed (embedded) capture path behaviors.
//!
//! Covered here:
//! - S6: one BACKUP statement with schema-only settings and PARTITIONS
//!   only for the selected table, zero data size, `embedded` tag
//! - the rejections: sharded mode, missing embedded disk, RBAC/config
//!   flags, empty table set (unconditional)
//! - data-size resolution: engine-reported, and both fallback queries
//! - parts synthesis from the embedded layout, prefix-filtered

mod common;

use tempfile::TempDir;

use colbackup::config::{Config, ShardedOperationMode};
use colbackup::database::{DiskType, SystemBackupRow};
use colbackup::metadata::{BackupManifest, TableMetadata, META_FILE_NAME, TAG_EMBEDDED};
use colbackup::{BackupError, BackupManager, CreateOptions};

use common::{merge_tree_table, MockAdapter};

fn embedded_config() -> Config {
    let mut config = Config::default();
    config.server.use_embedded_backup_restore = true;
    config.server.embedded_backup_disk = "backups".to_string();
    config
}

fn embedded_manager(adapter: &MockAdapter) -> BackupManager {
    BackupManager::new(embedded_config(), Box::new(adapter.clone()))
}

fn options(name: &str) -> CreateOptions {
    CreateOptions {
        backup_name: Some(name.to_string()),
        ..CreateOptions::default()
    }
}

fn complete_row() -> SystemBackupRow {
    SystemBackupRow {
        status: "BACKUP_COMPLETE".to_string(),
        compressed_size: 0,
    }
}

fn seeded_adapter(tmp: &TempDir) -> MockAdapter {
    let adapter = MockAdapter::new();
    adapter.add_disk(tmp.path(), "default", DiskType::Local);
    adapter.add_disk(tmp.path(), "backups", DiskType::Local);
    adapter.add_table(merge_tree_table("d", "t1", 100));
    adapter.add_table(merge_tree_table("d", "t2", 200));
    adapter.add_part("d", "t1", "default", "20240101_1_1_0", &[("data.bin", b"aa")]);
    adapter.add_part("d", "t1", "default", "20240102_2_2_0", &[("data.bin", b"bb")]);
    adapter.add_part("d", "t2", "default", "20240101_3_3_0", &[("data.bin", b"cc")]);
    adapter.set_backup_rows(vec![complete_row()]);
    adapter
}

/// S6: schema-only embedded backup of two tables, one with a partition
/// selector.
#[test]
fn test_schema_only_embedded_statement_and_manifest() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);

    let mut opts = options("b1");
    opts.schema_only = true;
    opts.partitions = vec!["d.t1:20240101".to_string()];
    embedded_manager(&adapter).create_backup(&opts).unwrap();

    let statements = adapter.statements();
    assert_eq!(statements.len(), 1);
    // Only the qualified table carries the PARTITIONS clause
    assert_eq!(
        statements[0],
        "BACKUP TABLE `d`.`t1` PARTITIONS '20240101', TABLE `d`.`t2` \
         TO Disk('backups','b1') SETTINGS structure_only=1, \
         show_table_uuid_in_table_create_query_if_not_nil=1"
    );

    let backup_path = tmp.path().join("backups/b1");
    let manifest = BackupManifest::load(&backup_path.join(META_FILE_NAME)).unwrap();
    assert_eq!(manifest.tags, TAG_EMBEDDED);
    assert_eq!(manifest.data_size, 0);
    assert_eq!(manifest.rbac_size, 0);
    assert_eq!(manifest.config_size, 0);
    assert_eq!(manifest.tables.len(), 2);
}

/// Parts are synthesized from the embedded layout with the same prefix
/// filter as the self-managed path, and sizes live only in the manifest.
#[test]
fn test_embedded_parts_synthesis() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);
    adapter.set_total_bytes(300);

    let mut opts = options("b1");
    opts.partitions = vec!["20240101".to_string()];
    embedded_manager(&adapter).create_backup(&opts).unwrap();

    let backup_path = tmp.path().join("backups/b1");
    let meta_path =
        TableMetadata::file_path(&backup_path.join("metadata"), "d", "t1");
    let meta = TableMetadata::load(&meta_path).unwrap();

    // Only the selected partition's part survives the filter
    let names: Vec<_> = meta.parts["backups"].iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["20240101_1_1_0"]);
    // Per-table size map is a single zero entry for the embedded disk
    assert_eq!(meta.size.len(), 1);
    assert_eq!(meta.size["backups"], 0);

    // The engine reported no size, so the system-tables sum is used
    let manifest = BackupManifest::load(&backup_path.join(META_FILE_NAME)).unwrap();
    assert_eq!(manifest.data_size, 300);
}

/// An engine-reported compressed size wins over the fallback queries.
#[test]
fn test_embedded_data_size_from_engine_report() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);
    adapter.set_backup_rows(vec![SystemBackupRow {
        status: "BACKUP_CREATED".to_string(),
        compressed_size: 4242,
    }]);
    adapter.set_total_bytes(999_999);

    embedded_manager(&adapter).create_backup(&options("b1")).unwrap();

    let manifest =
        BackupManifest::load(&tmp.path().join("backups/b1").join(META_FILE_NAME)).unwrap();
    assert_eq!(manifest.data_size, 4242);
}

/// Old engines fall back to summing system.parts instead of
/// system.tables.
#[test]
fn test_embedded_data_size_fallback_on_old_engine() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);
    adapter.set_version(20_003_000);
    adapter.set_parts_bytes(777);
    adapter.set_total_bytes(111);

    embedded_manager(&adapter).create_backup(&options("b1")).unwrap();

    let manifest =
        BackupManifest::load(&tmp.path().join("backups/b1").join(META_FILE_NAME)).unwrap();
    assert_eq!(manifest.data_size, 777);
}

/// A wrong statement result aborts the backup.
#[test]
fn test_embedded_rejects_wrong_statement_result() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);
    adapter.set_backup_rows(vec![SystemBackupRow {
        status: "BACKUP_FAILED".to_string(),
        compressed_size: 0,
    }]);

    let err = embedded_manager(&adapter)
        .create_backup(&options("b1"))
        .unwrap_err();

    assert!(matches!(err, BackupError::Database(_)));
}

#[test]
fn test_embedded_rejects_sharded_mode() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);

    let mut config = embedded_config();
    config.general.sharded_operation_mode = ShardedOperationMode::Table;
    let err = BackupManager::new(config, Box::new(adapter.clone()))
        .create_backup(&options("b1"))
        .unwrap_err();

    assert!(matches!(err, BackupError::Configuration(_)));
    assert!(adapter.statements().is_empty());
}

#[test]
fn test_embedded_rejects_missing_backup_disk() {
    let tmp = TempDir::new().unwrap();
    let adapter = MockAdapter::new();
    adapter.add_disk(tmp.path(), "default", DiskType::Local);
    adapter.add_table(merge_tree_table("d", "t", 0));
    adapter.set_backup_rows(vec![complete_row()]);

    let err = embedded_manager(&adapter)
        .create_backup(&options("b1"))
        .unwrap_err();

    assert!(matches!(err, BackupError::Configuration(_)));
}

#[test]
fn test_embedded_rejects_rbac_and_configs() {
    let tmp = TempDir::new().unwrap();
    let adapter = seeded_adapter(&tmp);

    for flag in ["rbac", "configs"] {
        let mut opts = options("b1");
        match flag {
            "rbac" => opts.rbac = true,
            _ => opts.configs = true,
        }
        let err = embedded_manager(&adapter)
            .create_backup(&opts)
            .unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)), "{}", flag);
    }
}

/// Property 11: the embedded path rejects empty table sets even when
/// empty backups are allowed.
#[test]
fn test_embedded_rejects_empty_table_set_unconditionally() {
    let tmp = TempDir::new().unwrap();
    let adapter = MockAdapter::new();
    adapter.add_disk(tmp.path(), "default", DiskType::Local);
    adapter.add_disk(tmp.path(), "backups", DiskType::Local);
    adapter.set_backup_rows(vec![complete_row()]);

    let mut config = embedded_config();
    config.general.allow_empty_backups = true;
    let err = BackupManager::new(config, Box::new(adapter.clone()))
        .create_backup(&options("b1"))
        .unwrap_err();

    assert!(matches!(err, BackupError::Precondition(_)));
    assert!(adapter.statements().is_empty());
}

/// Skipped tables are excluded from the statement and the metadata.
#[test]
fn test_embedded_skips_skipped_tables() {
    let tmp = TempDir::new().unwrap();
    let adapter = MockAdapter::new();
    adapter.add_disk(tmp.path(), "default", DiskType::Local);
    adapter.add_disk(tmp.path(), "backups", DiskType::Local);
    adapter.add_table(merge_tree_table("d", "kept", 0));
    let mut skipped = merge_tree_table("d", "dropped", 0);
    skipped.skip = true;
    adapter.add_table(skipped);
    adapter.set_backup_rows(vec![complete_row()]);

    embedded_manager(&adapter).create_backup(&options("b1")).unwrap();

    let statements = adapter.statements();
    assert_eq!(
        statements[0],
        "BACKUP TABLE `d`.`kept` TO Disk('backups','b1')"
    );
    let backup_path = tmp.path().join("backups/b1");
    assert!(
        TableMetadata::file_path(&backup_path.join("metadata"), "d", "kept").exists()
    );
    assert!(
        !TableMetadata::file_path(&backup_path.join("metadata"), "d", "dropped").exists()
    );
    // No data directory for a table the engine never captured
    assert!(!backup_path.join("data/d/dropped").exists());
}
