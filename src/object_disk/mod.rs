//! Object-disk support: part-object manifests, per-disk remote
//! connections, and the export of referenced objects into the backup's
//! own remote namespace.
//!
//! On an object disk every part file is a small manifest pointing at
//! objects in an external store. Capturing such a part means copying the
//! referenced objects under `<backup-name>/<disk-name>/…` next to moving
//! the manifest files themselves.

mod errors;

pub use errors::{ObjectDiskError, ObjectDiskResult};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use crate::cancel::CancelToken;
use crate::database::Disk;
use crate::observability::Logger;

/// One remote object referenced by a part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub remote_relative_path: String,
    pub size: u64,
}

/// Parsed part-object manifest.
///
/// The on-disk format is the engine's own metadata file layout: a format
/// version line, a `<count>\t<total_size>` line, then one
/// `<size>\t<relative_path>` line per object. Trailing lines (reference
/// count, read-only flag) are tolerated and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartObjectManifest {
    pub total_size: u64,
    pub objects: Vec<StorageObject>,
}

impl PartObjectManifest {
    /// Reads and parses one part file.
    pub fn read_from_file(path: &Path) -> ObjectDiskResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| ObjectDiskError::ManifestIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents).map_err(|details| ObjectDiskError::MalformedManifest {
            path: path.to_path_buf(),
            details,
        })
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let mut lines = contents.lines();

        let version_line = lines.next().ok_or("empty file")?;
        version_line
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("bad format version line: {:?}", version_line))?;

        let header = lines.next().ok_or("missing object count line")?;
        let mut header_fields = header.split('\t');
        let count: usize = header_fields
            .next()
            .and_then(|f| f.trim().parse().ok())
            .ok_or_else(|| format!("bad object count: {:?}", header))?;
        let total_size: u64 = header_fields
            .next()
            .and_then(|f| f.trim().parse().ok())
            .ok_or_else(|| format!("bad total size: {:?}", header))?;

        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            let line = lines.next().ok_or("truncated object list")?;
            let mut fields = line.splitn(2, '\t');
            let size: u64 = fields
                .next()
                .and_then(|f| f.trim().parse().ok())
                .ok_or_else(|| format!("bad object size: {:?}", line))?;
            let remote_relative_path = fields
                .next()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .ok_or_else(|| format!("bad object path: {:?}", line))?;
            objects.push(StorageObject {
                remote_relative_path,
                size,
            });
        }

        Ok(Self {
            total_size,
            objects,
        })
    }
}

/// Remote namespace of one object disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskConnection {
    pub bucket: String,
    pub remote_path: String,
}

/// Resolves per-disk remote credentials and endpoints. The concrete
/// client construction lives outside the core.
pub trait CredentialsProvider {
    fn connect(&self, disk: &Disk) -> ObjectDiskResult<DiskConnection>;
}

/// The outbound backup destination: copies objects into the backup's
/// remote namespace, server-side where the store supports it.
pub trait RemoteCopier {
    /// Destination kind for log lines ("s3", "azure_blob_storage", ...).
    fn kind(&self) -> &str;

    /// Copies one object and returns the destination's reported byte
    /// count.
    fn copy_object(&self, src_bucket: &str, src_key: &str, dst_key: &str)
        -> ObjectDiskResult<u64>;

    /// Releases the connection at backup end.
    fn close(&self) {}
}

/// Per-backup registry of disk connections.
///
/// Populated lazily, exactly one provider call per disk per backup;
/// read-mostly afterwards.
#[derive(Default)]
pub struct DiskConnections {
    connections: RwLock<HashMap<String, DiskConnection>>,
}

impl DiskConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for a disk, initializing it on first use.
    pub fn ensure(
        &self,
        disk: &Disk,
        provider: &dyn CredentialsProvider,
    ) -> ObjectDiskResult<DiskConnection> {
        if let Some(connection) = self.get(&disk.name) {
            return Ok(connection);
        }
        let connection = provider.connect(disk)?;
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(connections
            .entry(disk.name.clone())
            .or_insert(connection)
            .clone())
    }

    pub fn get(&self, disk_name: &str) -> Option<DiskConnection> {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        connections.get(disk_name).cloned()
    }
}

/// Joins object-store key segments with single slashes.
fn join_key(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Exports the remote objects referenced by every part file under a
/// table's moved shadow subtree on one object disk.
///
/// Returns the exported byte count for the disk: per part file,
/// `max(sum of copy-reported sizes, manifest total_size)` — copies that
/// report 0 on success must not shrink the recorded size.
pub fn export_part_objects(
    backup_name: &str,
    disk: &Disk,
    backup_shadow_path: &Path,
    connections: &DiskConnections,
    copier: &dyn RemoteCopier,
    cancel: &CancelToken,
    log: &Logger,
) -> ObjectDiskResult<u64> {
    let connection = connections
        .get(&disk.name)
        .ok_or_else(|| ObjectDiskError::ConnectionNotRegistered {
            disk: disk.name.clone(),
        })?;

    let mut size: u64 = 0;
    let mut manifest_files: Vec<std::path::PathBuf> = Vec::new();
    collect_regular_files(backup_shadow_path, &mut manifest_files)?;

    for file_path in manifest_files {
        cancel.check()?;
        let manifest = PartObjectManifest::read_from_file(&file_path)?;
        let mut reported: u64 = 0;
        for object in &manifest.objects {
            let src_key = join_key(&connection.remote_path, &object.remote_relative_path);
            let dst_key = join_key(
                &join_key(backup_name, &disk.name),
                &object.remote_relative_path,
            );
            reported += copier.copy_object(&connection.bucket, &src_key, &dst_key)?;
        }
        size += reported.max(manifest.total_size);
    }

    log.log(
        crate::observability::Severity::Debug,
        "object_disk data exported",
        &[("disk", &disk.name), ("kind", copier.kind())],
    );
    Ok(size)
}

fn collect_regular_files(
    root: &Path,
    out: &mut Vec<std::path::PathBuf>,
) -> ObjectDiskResult<()> {
    let entries = fs::read_dir(root).map_err(|e| ObjectDiskError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| ObjectDiskError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_regular_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
