//! Coordination-service access for replicated RBAC capture.
//!
//! Replicated access definitions live in the cluster's coordination
//! service rather than on any disk. Capture dumps the relevant subtree
//! to a newline-delimited JSON file inside the backup, one node per
//! line. The dump is idempotent per user-directory name.

mod errors;

pub use errors::{KeeperError, KeeperResult};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::config::KeeperConfig;

/// Minimal client surface the dump needs. The concrete session (wire
/// protocol, auth, watches) is an external collaborator.
pub trait KeeperConnection {
    /// Node payload; empty for structural nodes.
    fn get(&self, path: &str) -> KeeperResult<Vec<u8>>;

    /// Child node names, unordered.
    fn children(&self, path: &str) -> KeeperResult<Vec<String>>;

    fn close(&mut self) {}
}

/// Builds sessions from the adapter's configuration.
pub trait KeeperConnector {
    fn connect(&self) -> KeeperResult<Box<dyn KeeperConnection>>;
}

/// One dumped node.
#[derive(Debug, Serialize)]
struct DumpNode<'a> {
    path: &'a str,
    value: &'a str,
}

/// A connected coordination-service session scoped to the configured
/// access root.
pub struct Keeper {
    connection: Box<dyn KeeperConnection>,
    access_root: String,
}

impl Keeper {
    pub fn connect(connector: &dyn KeeperConnector, config: &KeeperConfig) -> KeeperResult<Self> {
        Ok(Self {
            connection: connector.connect()?,
            access_root: config.access_root.trim_end_matches('/').to_string(),
        })
    }

    /// Resolves the subtree root for one replicated user directory.
    pub fn replicated_access_path(&self, directory_name: &str) -> String {
        format!("{}/{}", self.access_root, directory_name)
    }

    /// Dumps a subtree to `dump_file` as newline-delimited JSON,
    /// depth-first, parents before children. Returns bytes written.
    pub fn dump(&self, root_path: &str, dump_file: &Path) -> KeeperResult<u64> {
        let file = File::create(dump_file).map_err(|e| KeeperError::DumpIo {
            path: dump_file.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;
        self.dump_node(root_path, &mut writer, dump_file, &mut written)?;
        writer.flush().map_err(|e| KeeperError::DumpIo {
            path: dump_file.to_path_buf(),
            source: e,
        })?;
        Ok(written)
    }

    fn dump_node(
        &self,
        path: &str,
        writer: &mut BufWriter<File>,
        dump_file: &Path,
        written: &mut u64,
    ) -> KeeperResult<()> {
        let value = self.connection.get(path)?;
        let value = String::from_utf8_lossy(&value);
        let node = DumpNode {
            path,
            value: &value,
        };
        let mut line = serde_json::to_vec(&node).map_err(|e| KeeperError::Serialize {
            path: path.to_string(),
            source: e,
        })?;
        line.push(b'\n');
        writer.write_all(&line).map_err(|e| KeeperError::DumpIo {
            path: dump_file.to_path_buf(),
            source: e,
        })?;
        *written += line.len() as u64;

        let mut children = self.connection.children(path)?;
        children.sort();
        for child in children {
            let child_path = format!("{}/{}", path.trim_end_matches('/'), child);
            self.dump_node(&child_path, writer, dump_file, written)?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}
