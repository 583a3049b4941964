//! Shared test doubles: a mock database adapter whose freeze materializes
//! real shadow trees on disk, a filesystem-backed remote copier, and an
//! in-memory coordination service.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use colbackup::common::table_path_encode;
use colbackup::database::{
    BackupType, DatabaseAdapter, DatabaseError, DatabaseInfo, DatabaseResult, Disk, DiskType,
    FunctionInfo, Mutation, SystemBackupRow, Table, TableRef,
};
use colbackup::keeper::{KeeperConnection, KeeperConnector, KeeperError, KeeperResult};
use colbackup::object_disk::{
    CredentialsProvider, DiskConnection, ObjectDiskError, ObjectDiskResult, RemoteCopier,
};

/// One part seeded into the mock server's data set.
#[derive(Debug, Clone)]
pub struct SeedPart {
    pub disk: String,
    pub name: String,
    /// Relative file name -> content.
    pub files: Vec<(String, Vec<u8>)>,
}

impl SeedPart {
    pub fn byte_size(&self) -> u64 {
        self.files.iter().map(|(_, data)| data.len() as u64).sum()
    }
}

#[derive(Default)]
struct MockState {
    disks: Vec<Disk>,
    databases: Vec<DatabaseInfo>,
    functions: Vec<FunctionInfo>,
    tables: Vec<Table>,
    parts: HashMap<TableRef, Vec<SeedPart>>,
    mutations: HashMap<TableRef, Vec<Mutation>>,
    version: u32,
    version_string: String,
    access_path: PathBuf,
    replicated_dirs: Vec<String>,
    total_bytes: u64,
    parts_bytes: u64,
    backup_rows: Vec<SystemBackupRow>,
    fail_freeze: HashSet<TableRef>,
    unfreeze_error_code: Option<i32>,
    freeze_calls: Vec<(TableRef, String)>,
    unfreeze_calls: Vec<(TableRef, String)>,
    statements: Vec<String>,
}

/// Mock database adapter.
///
/// `freeze_table` writes the table's seeded parts under
/// `<disk>/shadow/<uuid>/data/<enc(db)>/<enc(table)>/<part>/` the way a
/// real freeze would; `unfreeze_table` removes that shadow directory;
/// `execute_backup` materializes the embedded layout under the embedded
/// disk.
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        let adapter = Self::default();
        {
            let mut state = adapter.state.lock().unwrap();
            state.version = 21_008_003;
            state.version_string = "21.8.3.44".to_string();
        }
        adapter
    }

    pub fn add_disk(&self, root: &Path, name: &str, disk_type: DiskType) -> Disk {
        let path = root.join(name);
        fs::create_dir_all(&path).unwrap();
        let disk = Disk {
            name: name.to_string(),
            path,
            disk_type,
        };
        self.state.lock().unwrap().disks.push(disk.clone());
        disk
    }

    pub fn add_table(&self, table: Table) {
        self.state.lock().unwrap().tables.push(table);
    }

    pub fn add_database(&self, name: &str, engine: &str) {
        self.state.lock().unwrap().databases.push(DatabaseInfo {
            name: name.to_string(),
            engine: engine.to_string(),
            query: format!("CREATE DATABASE {} ENGINE = {}", name, engine),
        });
    }

    pub fn add_function(&self, name: &str) {
        self.state.lock().unwrap().functions.push(FunctionInfo {
            name: name.to_string(),
            create_query: format!("CREATE FUNCTION {} AS (x) -> x + 1", name),
        });
    }

    pub fn add_part(&self, database: &str, table: &str, disk: &str, part: &str, files: &[(&str, &[u8])]) {
        let seed = SeedPart {
            disk: disk.to_string(),
            name: part.to_string(),
            files: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
        };
        self.state
            .lock()
            .unwrap()
            .parts
            .entry(TableRef::new(database, table))
            .or_default()
            .push(seed);
    }

    pub fn set_version(&self, version: u32) {
        self.state.lock().unwrap().version = version;
    }

    pub fn set_mutations(&self, database: &str, table: &str, mutations: Vec<Mutation>) {
        self.state
            .lock()
            .unwrap()
            .mutations
            .insert(TableRef::new(database, table), mutations);
    }

    pub fn set_access_path(&self, path: &Path) {
        self.state.lock().unwrap().access_path = path.to_path_buf();
    }

    pub fn add_replicated_dir(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .replicated_dirs
            .push(name.to_string());
    }

    pub fn set_total_bytes(&self, bytes: u64) {
        self.state.lock().unwrap().total_bytes = bytes;
    }

    pub fn set_parts_bytes(&self, bytes: u64) {
        self.state.lock().unwrap().parts_bytes = bytes;
    }

    pub fn set_backup_rows(&self, rows: Vec<SystemBackupRow>) {
        self.state.lock().unwrap().backup_rows = rows;
    }

    pub fn fail_freeze_for(&self, database: &str, table: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_freeze
            .insert(TableRef::new(database, table));
    }

    pub fn set_unfreeze_error(&self, code: i32) {
        self.state.lock().unwrap().unfreeze_error_code = Some(code);
    }

    pub fn freeze_calls(&self) -> Vec<(TableRef, String)> {
        self.state.lock().unwrap().freeze_calls.clone()
    }

    pub fn unfreeze_calls(&self) -> Vec<(TableRef, String)> {
        self.state.lock().unwrap().unfreeze_calls.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    fn disk_by_name(state: &MockState, name: &str) -> Option<Disk> {
        state.disks.iter().find(|d| d.name == name).cloned()
    }
}

impl DatabaseAdapter for MockAdapter {
    fn databases(&self, _table_pattern: &str) -> DatabaseResult<Vec<DatabaseInfo>> {
        Ok(self.state.lock().unwrap().databases.clone())
    }

    fn tables(&self, _table_pattern: &str) -> DatabaseResult<Vec<Table>> {
        Ok(self.state.lock().unwrap().tables.clone())
    }

    fn user_defined_functions(&self) -> DatabaseResult<Vec<FunctionInfo>> {
        Ok(self.state.lock().unwrap().functions.clone())
    }

    fn disks(&self) -> DatabaseResult<Vec<Disk>> {
        Ok(self.state.lock().unwrap().disks.clone())
    }

    fn version(&self) -> DatabaseResult<u32> {
        Ok(self.state.lock().unwrap().version)
    }

    fn version_describe(&self) -> String {
        self.state.lock().unwrap().version_string.clone()
    }

    fn freeze_table(&self, table: &Table, with_name: &str) -> DatabaseResult<()> {
        let mut state = self.state.lock().unwrap();
        let table_ref = TableRef::for_table(table);
        state
            .freeze_calls
            .push((table_ref.clone(), with_name.to_string()));
        if state.fail_freeze.contains(&table_ref) {
            return Err(DatabaseError::query(format!(
                "freeze failed for {}",
                table_ref
            )));
        }
        let parts = state.parts.get(&table_ref).cloned().unwrap_or_default();
        for part in parts {
            let disk = match MockAdapter::disk_by_name(&state, &part.disk) {
                Some(disk) => disk,
                None => continue,
            };
            let part_dir = disk
                .path
                .join("shadow")
                .join(with_name)
                .join("data")
                .join(table_path_encode(&table.database))
                .join(table_path_encode(&table.name))
                .join(&part.name);
            fs::create_dir_all(&part_dir).unwrap();
            for (file_name, data) in &part.files {
                fs::write(part_dir.join(file_name), data).unwrap();
            }
        }
        Ok(())
    }

    fn unfreeze_table(&self, table: &Table, with_name: &str) -> DatabaseResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .unfreeze_calls
            .push((TableRef::for_table(table), with_name.to_string()));
        if let Some(code) = state.unfreeze_error_code {
            return Err(DatabaseError::query_with_code(code, "unfreeze failed"));
        }
        for disk in state.disks.clone() {
            let shadow = disk.path.join("shadow").join(with_name);
            if shadow.exists() {
                fs::remove_dir_all(&shadow).unwrap();
            }
        }
        Ok(())
    }

    fn in_progress_mutations(&self, database: &str, table: &str) -> DatabaseResult<Vec<Mutation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .mutations
            .get(&TableRef::new(database, table))
            .cloned()
            .unwrap_or_default())
    }

    fn check_parts_columns(&self, _table: &Table) -> DatabaseResult<()> {
        Ok(())
    }

    fn replicated_user_directories(&self) -> DatabaseResult<Vec<String>> {
        Ok(self.state.lock().unwrap().replicated_dirs.clone())
    }

    fn tables_total_bytes(&self, _tables: &[TableRef]) -> DatabaseResult<u64> {
        Ok(self.state.lock().unwrap().total_bytes)
    }

    fn parts_bytes_on_disk(&self, _tables: &[TableRef]) -> DatabaseResult<u64> {
        Ok(self.state.lock().unwrap().parts_bytes)
    }

    fn execute_backup(&self, statement: &str) -> DatabaseResult<Vec<SystemBackupRow>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.to_string());

        // Materialize the embedded layout the way the engine would.
        if let Some((disk_name, backup_name)) = parse_disk_target(statement) {
            if let Some(disk) = MockAdapter::disk_by_name(&state, &disk_name) {
                for table in state.tables.clone() {
                    if table.skip {
                        continue;
                    }
                    let table_ref = TableRef::for_table(&table);
                    let parts = state.parts.get(&table_ref).cloned().unwrap_or_default();
                    for part in parts {
                        let part_dir = disk
                            .path
                            .join(&backup_name)
                            .join("data")
                            .join(table_path_encode(&table.database))
                            .join(table_path_encode(&table.name))
                            .join(&part.name);
                        fs::create_dir_all(&part_dir).unwrap();
                        for (file_name, data) in &part.files {
                            fs::write(part_dir.join(file_name), data).unwrap();
                        }
                    }
                }
            }
        }

        Ok(state.backup_rows.clone())
    }

    fn resolve_partition_id(
        &self,
        _database: &str,
        _table: &str,
        expression: &str,
    ) -> DatabaseResult<Option<String>> {
        // Value tuples translate by stripping parentheses and commas:
        // `(2024,1)` -> `20241`. Anything unparenthesized never reaches
        // the adapter.
        let id: String = expression
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | ',' | '\''))
            .collect();
        Ok(if id.is_empty() { None } else { Some(id) })
    }

    fn access_management_path(&self, _disks: &[Disk]) -> DatabaseResult<PathBuf> {
        Ok(self.state.lock().unwrap().access_path.clone())
    }
}

fn parse_disk_target(statement: &str) -> Option<(String, String)> {
    let start = statement.find("TO Disk('")? + "TO Disk('".len();
    let rest = &statement[start..];
    let end = rest.find("')")?;
    let mut fields = rest[..end].splitn(2, "','");
    Some((fields.next()?.to_string(), fields.next()?.to_string()))
}

/// A MergeTree table that carries data.
pub fn merge_tree_table(database: &str, name: &str, total_bytes: u64) -> Table {
    Table {
        database: database.to_string(),
        name: name.to_string(),
        engine: "MergeTree".to_string(),
        create_table_query: format!(
            "CREATE TABLE `{}`.`{}` (d Date, x UInt64) ENGINE = MergeTree ORDER BY d",
            database, name
        ),
        total_bytes,
        skip: false,
        backup_type: BackupType::Full,
    }
}

/// Filesystem-backed remote object store shared by source disks and the
/// backup destination.
pub struct MockRemoteStore {
    pub root: PathBuf,
    pub backup_bucket: String,
}

impl MockRemoteStore {
    pub fn new(root: &Path) -> Self {
        fs::create_dir_all(root).unwrap();
        Self {
            root: root.to_path_buf(),
            backup_bucket: "backup-bucket".to_string(),
        }
    }

    /// Seeds one object into a source bucket.
    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) {
        let path = self.root.join(bucket).join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    pub fn object_exists(&self, bucket: &str, key: &str) -> bool {
        self.root.join(bucket).join(key).exists()
    }
}

/// Remote copier over [`MockRemoteStore`]. `report_zero` simulates
/// stores whose server-side copy reports 0 bytes on success.
pub struct MockRemoteCopier {
    pub root: PathBuf,
    pub backup_bucket: String,
    pub report_zero: bool,
}

impl MockRemoteCopier {
    pub fn new(store: &MockRemoteStore, report_zero: bool) -> Self {
        Self {
            root: store.root.clone(),
            backup_bucket: store.backup_bucket.clone(),
            report_zero,
        }
    }
}

impl RemoteCopier for MockRemoteCopier {
    fn kind(&self) -> &str {
        "s3"
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> ObjectDiskResult<u64> {
        let src = self.root.join(src_bucket).join(src_key);
        let data = fs::read(&src).map_err(|e| ObjectDiskError::Copy {
            src_bucket: src_bucket.to_string(),
            src_key: src_key.to_string(),
            dst_key: dst_key.to_string(),
            details: e.to_string(),
        })?;
        let dst = self.root.join(&self.backup_bucket).join(dst_key);
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, &data).unwrap();
        Ok(if self.report_zero { 0 } else { data.len() as u64 })
    }
}

/// Credentials provider with one static connection per disk name.
#[derive(Default)]
pub struct MockCredentials {
    connections: HashMap<String, DiskConnection>,
}

impl MockCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, disk_name: &str, bucket: &str, remote_path: &str) {
        self.connections.insert(
            disk_name.to_string(),
            DiskConnection {
                bucket: bucket.to_string(),
                remote_path: remote_path.to_string(),
            },
        );
    }
}

impl CredentialsProvider for MockCredentials {
    fn connect(&self, disk: &Disk) -> ObjectDiskResult<DiskConnection> {
        self.connections
            .get(&disk.name)
            .cloned()
            .ok_or_else(|| ObjectDiskError::Connect {
                disk: disk.name.clone(),
                details: "no credentials seeded".to_string(),
            })
    }
}

/// In-memory coordination-service tree.
pub struct MockKeeperConnector {
    pub nodes: Vec<(String, String)>,
}

impl MockKeeperConnector {
    pub fn new(nodes: &[(&str, &str)]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|(path, value)| (path.to_string(), value.to_string()))
                .collect(),
        }
    }
}

struct MockKeeperConnection {
    nodes: Vec<(String, String)>,
}

impl KeeperConnection for MockKeeperConnection {
    fn get(&self, path: &str) -> KeeperResult<Vec<u8>> {
        self.nodes
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, value)| value.as_bytes().to_vec())
            .ok_or_else(|| KeeperError::Request {
                path: path.to_string(),
                details: "no node".to_string(),
            })
    }

    fn children(&self, path: &str) -> KeeperResult<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .nodes
            .iter()
            .filter_map(|(p, _)| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect())
    }
}

impl KeeperConnector for MockKeeperConnector {
    fn connect(&self) -> KeeperResult<Box<dyn KeeperConnection>> {
        Ok(Box::new(MockKeeperConnection {
            nodes: self.nodes.clone(),
        }))
    }
}
