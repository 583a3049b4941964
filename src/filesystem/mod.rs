//! Filesystem helpers for backup capture.
//!
//! Directory creation and ownership handoff to the database runtime user,
//! recursive copies for configs/access capture, and the shadow-tree part
//! move that turns a frozen table into backup content.
//!
//! Part moves use `rename` so hardlinks created by the freeze survive;
//! only a cross-filesystem destination falls back to copy-and-delete.

mod errors;

pub use errors::{FilesystemError, FsResult};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::metadata::Part;

/// Numeric owner of the database's data directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Resolves the runtime user of the database from the ownership of one of
/// its data directories. `None` when the path cannot be inspected (the
/// caller then skips ownership handoff).
#[cfg(unix)]
pub fn resolve_owner(path: &Path) -> Option<Owner> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).ok()?;
    Some(Owner {
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

#[cfg(not(unix))]
pub fn resolve_owner(_path: &Path) -> Option<Owner> {
    None
}

/// Changes ownership of a single path. Best-effort semantics are the
/// caller's choice: cleanup paths warn, capture paths propagate.
#[cfg(unix)]
pub fn chown_path(path: &Path, owner: Owner) -> FsResult<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| FilesystemError::invalid_path(path))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), owner.uid, owner.gid) };
    if rc != 0 {
        return Err(FilesystemError::io(path, std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn chown_path(_path: &Path, _owner: Owner) -> FsResult<()> {
    Ok(())
}

/// Creates a directory (and its ancestors) and hands the leaf over to the
/// database runtime user when one is known.
pub fn mkdir_all(path: &Path, owner: Option<Owner>) -> FsResult<()> {
    fs::create_dir_all(path).map_err(|e| FilesystemError::io(path, e))?;
    if let Some(owner) = owner {
        chown_path(path, owner)?;
    }
    Ok(())
}

/// Recursively copies a directory, returning the number of regular-file
/// bytes copied. Symlinks and special files are skipped.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> FsResult<u64> {
    fs::create_dir_all(dst).map_err(|e| FilesystemError::io(dst, e))?;

    let mut copied: u64 = 0;
    let entries = fs::read_dir(src).map_err(|e| FilesystemError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| FilesystemError::io(&src_path, e))?;

        if file_type.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            copied +=
                fs::copy(&src_path, &dst_path).map_err(|e| FilesystemError::io(&src_path, e))?;
        }
    }
    Ok(copied)
}

/// True iff the part directory name is selected by the prefix filter:
/// either no prefixes were supplied, or the name starts with
/// `<prefix>_` for some prefix.
pub fn part_matches(part_name: &str, prefixes: &HashSet<String>) -> bool {
    if prefixes.is_empty() {
        return true;
    }
    prefixes
        .iter()
        .any(|prefix| part_name.starts_with(&format!("{}_", prefix)))
}

/// Moves the selected part directories of one frozen table from its
/// shadow tree into the backup tree.
///
/// The freeze produces either `store/<p>/<uuid>/<part>` or
/// `data/<db>/<table>/<part>` under the shadow directory; part
/// directories sit at relative depth 4 in both layouts. Each selected
/// part is moved whole, and its regular-file bytes are summed before the
/// move.
///
/// Part ordering follows directory enumeration and carries no meaning;
/// a duplicate part name is an error.
pub fn move_shadow(
    shadow_path: &Path,
    backup_parts_path: &Path,
    partition_prefixes: &HashSet<String>,
) -> FsResult<(Vec<Part>, u64)> {
    let mut parts: Vec<Part> = Vec::new();
    let mut size: u64 = 0;

    let mut part_dirs: Vec<PathBuf> = Vec::new();
    collect_part_dirs(shadow_path, 1, &mut part_dirs)?;

    for part_dir in part_dirs {
        let part_name = match part_dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => return Err(FilesystemError::invalid_path(&part_dir)),
        };
        if !part_matches(&part_name, partition_prefixes) {
            continue;
        }
        if parts.iter().any(|p| p.name == part_name) {
            return Err(FilesystemError::DuplicatePart {
                part: part_name,
                path: backup_parts_path.to_path_buf(),
            });
        }

        let dst = backup_parts_path.join(&part_name);
        if dst.exists() {
            return Err(FilesystemError::DuplicatePart {
                part: part_name,
                path: backup_parts_path.to_path_buf(),
            });
        }

        size += dir_size(&part_dir)?;
        move_dir(&part_dir, &dst)?;
        parts.push(Part { name: part_name });
    }

    Ok((parts, size))
}

/// Collects directories at relative depth 4 under `root` (depth 1 is a
/// direct child of the shadow directory).
fn collect_part_dirs(root: &Path, depth: usize, out: &mut Vec<PathBuf>) -> FsResult<()> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(FilesystemError::io(root, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if depth == 4 {
            out.push(path);
        } else {
            collect_part_dirs(&path, depth + 1, out)?;
        }
    }
    Ok(())
}

/// Sum of regular-file bytes under a directory.
fn dir_size(path: &Path) -> FsResult<u64> {
    let mut size: u64 = 0;
    let entries = fs::read_dir(path).map_err(|e| FilesystemError::io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::io(path, e))?;
        let entry_path = entry.path();
        let meta = fs::symlink_metadata(&entry_path)
            .map_err(|e| FilesystemError::io(&entry_path, e))?;
        if meta.is_dir() {
            size += dir_size(&entry_path)?;
        } else if meta.is_file() {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Moves a directory, preserving hardlinks when source and destination
/// share a filesystem; otherwise copies and deletes.
fn move_dir(src: &Path, dst: &Path) -> FsResult<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src).map_err(|e| FilesystemError::io(src, e))
        }
    }
}
