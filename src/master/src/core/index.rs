use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use common::schemas::NodeId;

/// One stored copy of a file on one keeper.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub file_name: String,
    pub node_id: NodeId,
    pub local_path: String,
    pub size: u64,
    pub etag: String,
}

/// File name -> copies. At most one record per (file, node).
#[derive(Debug, Default)]
pub struct FileIndex {
    files: BTreeMap<String, Vec<FileRecord>>,
}

impl FileIndex {
    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains_key(file_name)
    }

    pub fn holders(&self, file_name: &str) -> &[FileRecord] {
        self.files.get(file_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn holds(&self, file_name: &str, node_id: NodeId) -> bool {
        self.holders(file_name).iter().any(|r| r.node_id == node_id)
    }

    /// Insert, or update in place if the node already has a copy. Returns
    /// true when the record is new.
    pub fn upsert(&mut self, record: FileRecord) -> bool {
        let copies = self.files.entry(record.file_name.clone()).or_default();
        match copies.iter_mut().find(|r| r.node_id == record.node_id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                copies.push(record);
                true
            }
        }
    }

    /// Remove the copy on `node_id`, but only if it still points at `local_path`.
    pub fn remove(&mut self, file_name: &str, node_id: NodeId, local_path: &str) -> bool {
        let Some(copies) = self.files.get_mut(file_name) else {
            return false;
        };
        let before = copies.len();
        copies.retain(|r| !(r.node_id == node_id && r.local_path == local_path));
        let removed = copies.len() != before;
        if copies.is_empty() {
            self.files.remove(file_name);
        }
        removed
    }

    pub fn file_names(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values().flatten()
    }
}
