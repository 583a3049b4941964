//! Backup orchestration.
//!
//! `BackupManager::create_backup` drives the whole pipeline: validate,
//! enumerate cluster state, pick the capture path (self-managed freeze
//! and move, or the engine's own BACKUP statement), capture access
//! control and configuration, write the manifest, then trigger retention
//! cleanup.
//!
//! Failure discipline: anything that fails after the backup directory
//! was created removes that directory in full before the error
//! propagates. The one exception is cancellation, which leaves the
//! directory (without its commit marker) for retention. No step in the
//! create path retries.

mod embedded;
mod errors;
mod local;
mod table;

pub use errors::{BackupError, BackupResult};
pub use local::LocalBackup;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::common::{format_bytes, new_backup_name, sanitize_backup_name};
use crate::config::Config;
use crate::database::{
    BackupType, DatabaseAdapter, DatabaseInfo, Disk, FunctionInfo, Table, TableRef,
};
use crate::filesystem::{self, copy_dir_recursive, mkdir_all, Owner};
use crate::keeper::{Keeper, KeeperConnector, KeeperError};
use crate::metadata::{BackupManifest, TableMetadata, META_FILE_NAME, TAG_REGULAR};
use crate::object_disk::{CredentialsProvider, DiskConnections, RemoteCopier};
use crate::observability::Logger;
use crate::partition::{self, PartitionSelection};

/// Flags and selectors for one backup creation.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Backup name; empty or absent means "derive from current UTC time".
    pub backup_name: Option<String>,
    /// Pattern selecting databases and tables.
    pub table_pattern: String,
    /// Partition expressions (names or value tuples), applied to every
    /// selected table that contains them.
    pub partitions: Vec<String>,
    pub schema_only: bool,
    /// Capture access-control entries alongside tables.
    pub rbac: bool,
    /// Capture only access-control entries.
    pub rbac_only: bool,
    /// Capture server configuration files alongside tables.
    pub configs: bool,
    /// Capture only server configuration files.
    pub configs_only: bool,
    /// Disable the part-column uniformity check for this run.
    pub skip_check_parts_columns: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            backup_name: None,
            table_pattern: "*".to_string(),
            partitions: Vec::new(),
            schema_only: false,
            rbac: false,
            rbac_only: false,
            configs: false,
            configs_only: false,
            skip_check_parts_columns: false,
        }
    }
}

/// Drives backup creation against one database server.
pub struct BackupManager {
    config: Config,
    adapter: Box<dyn DatabaseAdapter>,
    remote: Option<Box<dyn RemoteCopier>>,
    credentials: Option<Box<dyn CredentialsProvider>>,
    keeper_connector: Option<Box<dyn KeeperConnector>>,
    disk_connections: DiskConnections,
    cancel: CancelToken,
    log: Logger,
}

impl BackupManager {
    pub fn new(config: Config, adapter: Box<dyn DatabaseAdapter>) -> Self {
        Self {
            config,
            adapter,
            remote: None,
            credentials: None,
            keeper_connector: None,
            disk_connections: DiskConnections::new(),
            cancel: CancelToken::new(),
            log: Logger::new(),
        }
    }

    /// Attaches the outbound backup destination for object-disk export.
    pub fn with_remote_copier(mut self, remote: Box<dyn RemoteCopier>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Attaches the per-disk credentials resolver for object disks.
    pub fn with_credentials_provider(mut self, provider: Box<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Attaches the coordination-service connector for replicated RBAC.
    pub fn with_keeper_connector(mut self, connector: Box<dyn KeeperConnector>) -> Self {
        self.keeper_connector = Some(connector);
        self
    }

    /// Shares a cancellation token with the caller.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creates a new backup of all tables matched by the options'
    /// pattern. An empty name is replaced with the current UTC time.
    pub fn create_backup(&self, options: &CreateOptions) -> BackupResult<()> {
        let started = Instant::now();

        let backup_name = options
            .backup_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(new_backup_name);
        let backup_name = sanitize_backup_name(&backup_name);
        if backup_name.is_empty() {
            return Err(BackupError::Configuration(
                "backup name is empty after sanitizing".to_string(),
            ));
        }

        let log = self
            .log
            .with_fields(&[("backup", &backup_name), ("operation", "create")]);

        let do_backup_data = !(options.schema_only || options.rbac_only || options.configs_only);

        let all_databases = self.adapter.databases(&options.table_pattern)?;
        let tables = self.adapter.tables(&options.table_pattern)?;
        let live_tables = tables.iter().filter(|t| !t.skip).count();
        if live_tables == 0 && !self.config.general.allow_empty_backups {
            return Err(BackupError::Precondition("no tables for backup".to_string()));
        }
        let all_functions = self.adapter.user_defined_functions()?;
        let disks = self.adapter.disks()?;
        let selection = partition::resolve(self.adapter.as_ref(), &tables, &options.partitions)?;

        let result = if self.config.server.use_embedded_backup_restore {
            self.create_backup_embedded(
                &backup_name,
                options,
                &selection,
                &tables,
                &all_databases,
                &all_functions,
                &disks,
                &log,
            )
        } else {
            self.create_backup_local(
                &backup_name,
                options,
                do_backup_data,
                &selection,
                &tables,
                &all_databases,
                &all_functions,
                &disks,
                &log,
            )
        };
        if let Some(remote) = self.remote.as_deref() {
            remote.close();
        }
        result?;

        self.remove_old_backups_local(&disks, &log)?;
        log.log(
            crate::observability::Severity::Info,
            "done",
            &[("duration", &format_duration(started))],
        );
        Ok(())
    }

    /// Self-managed capture: freeze, move, export, unfreeze, per table.
    #[allow(clippy::too_many_arguments)]
    fn create_backup_local(
        &self,
        backup_name: &str,
        options: &CreateOptions,
        do_backup_data: bool,
        selection: &PartitionSelection,
        tables: &[Table],
        all_databases: &[DatabaseInfo],
        all_functions: &[FunctionInfo],
        disks: &[Disk],
        log: &Logger,
    ) -> BackupResult<()> {
        let default_path = default_disk_path(disks)?;
        let owner = filesystem::resolve_owner(&default_path);

        for disk in disks {
            mkdir_all(&disk.path.join("backup"), owner)?;
        }

        let backup_path = default_path.join("backup").join(backup_name);
        if backup_path.join(META_FILE_NAME).exists() {
            return Err(BackupError::Precondition(format!(
                "'{}' metadata.json already exists",
                backup_name
            )));
        }
        if !backup_path.exists() {
            mkdir_all(&backup_path, owner)?;
        }

        let check_parts_columns =
            self.config.server.check_parts_columns && !options.skip_check_parts_columns;

        let mut backup_data_size: u64 = 0;
        let mut backup_metadata_size: u64 = 0;
        let mut table_metas: Vec<TableRef> = Vec::new();

        for table in tables {
            if table.skip || table.backup_type == BackupType::Skipped {
                continue;
            }
            self.cancel.check()?;

            let table_ref = TableRef::for_table(table);
            let table_log = log.with_field("table", &table_ref.to_string());

            let mut real_size: BTreeMap<String, u64> = BTreeMap::new();
            let mut parts_by_disk = BTreeMap::new();
            if do_backup_data && table.backup_type == BackupType::Full {
                table_log.debug("create data");
                let shadow_uuid = uuid::Uuid::new_v4().simple().to_string();
                let prefixes = selection.prefixes_for(&table_ref);
                match self.add_table_to_backup(
                    backup_name,
                    &shadow_uuid,
                    disks,
                    table,
                    &prefixes,
                    check_parts_columns,
                    owner,
                    &table_log,
                ) {
                    Ok(Some((parts, sizes))) => {
                        parts_by_disk = parts;
                        real_size = sizes;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        if err.is_cancelled() {
                            return Err(err);
                        }
                        table_log.error(&err.to_string());
                        self.unfreeze_best_effort(table, &shadow_uuid);
                        self.cleanup_backup(backup_name, disks, log);
                        self.clean_shadow_logged(disks, log);
                        return Err(err);
                    }
                }
                backup_data_size += real_size.values().sum::<u64>();
            }

            let mut mutations = Vec::new();
            if self.config.server.backup_mutations && do_backup_data {
                table_log.debug("get in progress mutations list");
                mutations = match self
                    .adapter
                    .in_progress_mutations(&table.database, &table.name)
                {
                    Ok(mutations) => mutations,
                    Err(err) => {
                        table_log.error(&err.to_string());
                        self.cleanup_backup(backup_name, disks, log);
                        return Err(err.into());
                    }
                };
            }

            if options.schema_only || do_backup_data {
                table_log.debug("create metadata");
                let record = TableMetadata {
                    table: table.name.clone(),
                    database: table.database.clone(),
                    query: table.create_table_query.clone(),
                    total_bytes: table.total_bytes,
                    size: real_size,
                    parts: parts_by_disk,
                    mutations,
                    metadata_only: options.schema_only
                        || table.backup_type == BackupType::SchemaOnly,
                };
                match record.save(&backup_path.join("metadata"), owner) {
                    Ok(written) => backup_metadata_size += written,
                    Err(err) => {
                        self.cleanup_backup(backup_name, disks, log);
                        return Err(err.into());
                    }
                }
                table_metas.push(table_ref);
            }
            table_log.info("done");
        }

        let mut backup_rbac_size: u64 = 0;
        let mut backup_config_size: u64 = 0;

        if options.rbac || options.rbac_only {
            match self.create_backup_rbac(&backup_path, disks, owner, log) {
                Ok(size) => {
                    backup_rbac_size = size;
                    log.log(
                        crate::observability::Severity::Info,
                        "done createBackupRBAC",
                        &[("size", &format_bytes(size))],
                    );
                }
                Err(err) => {
                    if err.is_cancelled() {
                        return Err(err);
                    }
                    log.fatal(&format!("error during do RBAC backup: {}", err));
                    self.cleanup_backup(backup_name, disks, log);
                    return Err(err);
                }
            }
        }
        if options.configs || options.configs_only {
            match self.create_backup_configs(&backup_path, log) {
                Ok(size) => {
                    backup_config_size = size;
                    log.log(
                        crate::observability::Severity::Info,
                        "done createBackupConfigs",
                        &[("size", &format_bytes(size))],
                    );
                }
                Err(err) => {
                    if err.is_cancelled() {
                        return Err(err);
                    }
                    log.fatal(&format!("error during do CONFIG backup: {}", err));
                    self.cleanup_backup(backup_name, disks, log);
                    return Err(err);
                }
            }
        }

        self.write_backup_manifest(
            &backup_path.join(META_FILE_NAME),
            backup_name,
            TAG_REGULAR,
            disks,
            backup_data_size,
            backup_metadata_size,
            backup_rbac_size,
            backup_config_size,
            table_metas,
            all_databases,
            all_functions,
            owner,
            log,
        )
    }

    /// Captures server configuration files into `<backup>/configs`.
    fn create_backup_configs(&self, backup_path: &Path, log: &Logger) -> BackupResult<u64> {
        self.cancel.check()?;
        let config_dir = &self.config.server.config_dir;
        let configs_backup = backup_path.join("configs");
        log.log(
            crate::observability::Severity::Debug,
            "copy configs",
            &[
                ("src", &config_dir.display().to_string()),
                ("dst", &configs_backup.display().to_string()),
            ],
        );
        Ok(copy_dir_recursive(config_dir, &configs_backup)?)
    }

    /// Captures access-control entries into `<backup>/access`: the local
    /// access directory plus one NDJSON dump per replicated user
    /// directory.
    fn create_backup_rbac(
        &self,
        backup_path: &Path,
        disks: &[Disk],
        owner: Option<Owner>,
        log: &Logger,
    ) -> BackupResult<u64> {
        self.cancel.check()?;
        let rbac_backup = backup_path.join("access");
        let access_path = self.adapter.access_management_path(disks)?;

        let mut size: u64 = 0;
        match std::fs::metadata(&access_path) {
            Ok(meta) if meta.is_dir() => {
                log.log(
                    crate::observability::Severity::Debug,
                    "copy access",
                    &[
                        ("src", &access_path.display().to_string()),
                        ("dst", &rbac_backup.display().to_string()),
                    ],
                );
                size += copy_dir_recursive(&access_path, &rbac_backup)?;
            }
            Ok(_) => {
                return Err(BackupError::Precondition(format!(
                    "{} is not a directory",
                    access_path.display()
                )));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                mkdir_all(&rbac_backup, owner)?;
            }
            Err(err) => {
                return Err(filesystem::FilesystemError::io(&access_path, err).into());
            }
        }

        size += self.create_backup_rbac_replicated(&rbac_backup, log)?;
        Ok(size)
    }

    fn create_backup_rbac_replicated(
        &self,
        rbac_backup: &Path,
        log: &Logger,
    ) -> BackupResult<u64> {
        let replicated = self.adapter.replicated_user_directories()?;
        if replicated.is_empty() {
            return Ok(0);
        }
        let connector = self.keeper_connector.as_deref().ok_or_else(|| {
            KeeperError::Connect("no coordination service connector configured".to_string())
        })?;
        let mut keeper = Keeper::connect(connector, &self.config.keeper)?;

        let mut size: u64 = 0;
        for directory in replicated {
            self.cancel.check()?;
            let access_path = keeper.replicated_access_path(&directory);
            let dump_file = rbac_backup.join(format!("{}.jsonl", directory));
            log.log(
                crate::observability::Severity::Info,
                "keeper dump",
                &[
                    ("src", &access_path),
                    ("dst", &dump_file.display().to_string()),
                ],
            );
            size += keeper.dump(&access_path, &dump_file)?;
        }
        keeper.close();
        Ok(size)
    }

    /// Writes the manifest, the commit marker of a backup. Any failure
    /// here removes the whole backup directory.
    #[allow(clippy::too_many_arguments)]
    fn write_backup_manifest(
        &self,
        meta_file: &Path,
        backup_name: &str,
        tags: &str,
        disks: &[Disk],
        data_size: u64,
        metadata_size: u64,
        rbac_size: u64,
        config_size: u64,
        tables: Vec<TableRef>,
        all_databases: &[DatabaseInfo],
        all_functions: &[FunctionInfo],
        owner: Option<Owner>,
        log: &Logger,
    ) -> BackupResult<()> {
        self.cancel.check()?;

        let mut disk_map = BTreeMap::new();
        let mut disk_types = BTreeMap::new();
        for disk in disks {
            disk_map.insert(disk.name.clone(), disk.path.display().to_string());
            disk_types.insert(disk.name.clone(), disk.disk_type.as_str().to_string());
        }

        let manifest = BackupManifest {
            backup_name: backup_name.to_string(),
            disks: disk_map,
            disk_types,
            version: crate::VERSION.to_string(),
            creation_date: chrono::Utc::now(),
            tags: tags.to_string(),
            server_version: self.adapter.version_describe(),
            data_size,
            metadata_size,
            rbac_size,
            config_size,
            tables,
            databases: all_databases.to_vec(),
            functions: all_functions.to_vec(),
        };

        if let Err(err) = manifest.save(meta_file, owner, log) {
            self.cleanup_backup(backup_name, disks, log);
            return Err(err.into());
        }
        Ok(())
    }

    /// Best-effort unfreeze on a failure path, so a failed capture does
    /// not leak frozen shadow state on engines that support UNFREEZE.
    fn unfreeze_best_effort(&self, table: &Table, shadow_uuid: &str) {
        if let Ok(version) = self.adapter.version() {
            if version > crate::database::VERSION_UNFREEZE {
                let _ = self.adapter.unfreeze_table(table, shadow_uuid);
            }
        }
    }

    /// Removes the backup directory on every disk, logging instead of
    /// masking the original error.
    fn cleanup_backup(&self, backup_name: &str, disks: &[Disk], log: &Logger) {
        if let Err(err) = self.remove_backup_local(backup_name, disks) {
            log.error(&err.to_string());
        }
    }

    fn clean_shadow_logged(&self, disks: &[Disk], log: &Logger) {
        if let Err(err) = self.clean_shadow(disks, log) {
            log.error(&err.to_string());
        }
    }
}

/// Root path of the `default` disk; every backup's metadata lives there.
fn default_disk_path(disks: &[Disk]) -> BackupResult<PathBuf> {
    disks
        .iter()
        .find(|disk| disk.name == "default")
        .map(|disk| disk.path.clone())
        .ok_or_else(|| {
            BackupError::Precondition(
                "data path is unknown, no default disk in the discovered disk set".to_string(),
            )
        })
}

fn format_duration(started: Instant) -> String {
    format!("{:.3}s", started.elapsed().as_secs_f64())
}
