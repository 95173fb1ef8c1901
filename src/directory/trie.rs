//! Byte-keyed file-name trie — the Directory's name index (spec §3, §4.3).
//!
//! Non-terminal nodes carry only child pointers; a terminal node owns its
//! [`FileRecord`] outright. All operations take the single registry-wide
//! lock for their full duration (unlike a sharded map, which would let
//! two mutators race on insert-vs-delete of the same name).

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::acl::Permission;
use crate::domain::file_record::FileRecord;
use crate::error::{Error, Result};

#[derive(Default)]
struct Node {
    children: HashMap<u8, Box<Node>>,
    record: Option<FileRecord>,
}

impl Node {
    fn insert(&mut self, name: &[u8], record: FileRecord) -> Result<()> {
        match name.split_first() {
            None => {
                if self.record.is_some() {
                    return Err(Error::conflict(format!("{} already exists", record.name)));
                }
                self.record = Some(record);
                Ok(())
            }
            Some((byte, rest)) => self.children.entry(*byte).or_default().insert(rest, record),
        }
    }

    fn get(&self, name: &[u8]) -> Option<&FileRecord> {
        match name.split_first() {
            None => self.record.as_ref(),
            Some((byte, rest)) => self.children.get(byte).and_then(|n| n.get(rest)),
        }
    }

    fn get_mut(&mut self, name: &[u8]) -> Option<&mut FileRecord> {
        match name.split_first() {
            None => self.record.as_mut(),
            Some((byte, rest)) => self.children.get_mut(byte).and_then(|n| n.get_mut(rest)),
        }
    }

    fn remove(&mut self, name: &[u8]) -> Option<FileRecord> {
        match name.split_first() {
            None => self.record.take(),
            Some((byte, rest)) => self.children.get_mut(byte).and_then(|n| n.remove(rest)),
        }
    }

    fn collect(&self, out: &mut Vec<FileRecord>) {
        if let Some(record) = &self.record {
            out.push(record.clone());
        }
        for child in self.children.values() {
            child.collect(out);
        }
    }

    fn collect_mut(&mut self, out: &mut Vec<&mut FileRecord>) {
        if let Some(record) = &mut self.record {
            out.push(record);
        }
        for child in self.children.values_mut() {
            child.collect_mut(out);
        }
    }
}

/// The Directory's file-name index.
pub struct FileTrie {
    root: RwLock<Node>,
}

impl Default for FileTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTrie {
    pub fn new() -> Self {
        Self { root: RwLock::new(Node::default()) }
    }

    pub async fn insert(&self, record: FileRecord) -> Result<()> {
        let mut root = self.root.write().await;
        root.insert(record.name.clone().as_bytes(), record)
    }

    pub async fn locate(&self, name: &str) -> Option<usize> {
        let root = self.root.read().await;
        root.get(name.as_bytes()).map(|r| r.node_index)
    }

    pub async fn view_details(&self, name: &str) -> Option<FileRecord> {
        let root = self.root.read().await;
        root.get(name.as_bytes()).cloned()
    }

    /// Deletes `name` if `identity` is its owner. Returns the removed
    /// record (for the caller to forward a disk-delete to its Node).
    pub async fn delete(&self, name: &str, identity: &str) -> Result<FileRecord> {
        let mut root = self.root.write().await;
        match root.get(name.as_bytes()) {
            None => return Err(Error::not_found(format!("{name}"))),
            Some(record) if record.owner != identity => {
                return Err(Error::unauthorized(format!("{identity} does not own {name}")))
            }
            Some(_) => {}
        }
        Ok(root.remove(name.as_bytes()).expect("checked present above"))
    }

    pub async fn grant(&self, name: &str, owner: &str, target: &str, perm: Permission) -> Result<()> {
        let mut root = self.root.write().await;
        let record = root.get_mut(name.as_bytes()).ok_or_else(|| Error::not_found(name))?;
        if record.owner != owner {
            return Err(Error::unauthorized(format!("{owner} does not own {name}")));
        }
        if target == record.owner {
            return Err(Error::bad_request("cannot grant the owner ACL permissions"));
        }
        record.acl.grant(target, perm).map_err(Error::conflict)
    }

    pub async fn revoke(&self, name: &str, owner: &str, target: &str) -> Result<()> {
        let mut root = self.root.write().await;
        let record = root.get_mut(name.as_bytes()).ok_or_else(|| Error::not_found(name))?;
        if record.owner != owner {
            return Err(Error::unauthorized(format!("{owner} does not own {name}")));
        }
        if record.acl.revoke(target) {
            Ok(())
        } else {
            Err(Error::not_found(format!("{target} on the ACL of {name}")))
        }
    }

    pub async fn permits(&self, name: &str, identity: &str, requested: Permission) -> Result<bool> {
        let root = self.root.read().await;
        let record = root.get(name.as_bytes()).ok_or_else(|| Error::not_found(name))?;
        Ok(record.permits(identity, requested))
    }

    pub async fn owner_of(&self, name: &str) -> Option<String> {
        let root = self.root.read().await;
        root.get(name.as_bytes()).map(|r| r.owner.clone())
    }

    /// Applies `f` to the record named `name`, if present.
    pub async fn update<F: FnOnce(&mut FileRecord)>(&self, name: &str, f: F) -> Result<()> {
        let mut root = self.root.write().await;
        let record = root.get_mut(name.as_bytes()).ok_or_else(|| Error::not_found(name))?;
        f(record);
        Ok(())
    }

    /// Inserts a record rebuilt from a Node's `REGISTER_FILE` sync frame,
    /// overwriting any stale entry of the same name (a Node re-registering
    /// is the source of truth for its own files).
    pub async fn rebuild_insert(&self, record: FileRecord) {
        let mut root = self.root.write().await;
        let _ = root.remove(record.name.clone().as_bytes());
        let _ = root.insert(record.name.clone().as_bytes(), record);
    }

    /// All records whose `node_index` equals `node_index`. Used by Node
    /// purge.
    pub async fn purge_by_node(&self, node_index: usize) -> Vec<String> {
        let mut root = self.root.write().await;
        let mut all = Vec::new();
        root.collect_mut(&mut all);
        let names: Vec<String> =
            all.iter().filter(|r| r.node_index == node_index).map(|r| r.name.clone()).collect();
        for name in &names {
            root.remove(name.as_bytes());
        }
        names
    }

    /// Top-level listing: files and folders with no folder prefix.
    pub async fn list_top_level(&self) -> (Vec<FileRecord>, Vec<String>) {
        let root = self.root.read().await;
        let mut all = Vec::new();
        root.collect(&mut all);
        let mut files = Vec::new();
        let mut folders = std::collections::BTreeSet::new();
        for record in all {
            match &record.folder {
                None => files.push(record),
                Some(folder) => {
                    let top = folder.split('/').next().unwrap_or(folder.as_str());
                    folders.insert(top.to_string());
                }
            }
        }
        (files, folders.into_iter().collect())
    }

    /// Immediate children of `folder`: files whose folder is exactly
    /// `folder`, plus one-level-deeper subfolder names.
    pub async fn list_folder(&self, folder: &str) -> (Vec<FileRecord>, Vec<String>) {
        let root = self.root.read().await;
        let mut all = Vec::new();
        root.collect(&mut all);
        let prefix = format!("{folder}/");
        let mut files = Vec::new();
        let mut subfolders = std::collections::BTreeSet::new();
        for record in all {
            let Some(record_folder) = &record.folder else { continue };
            if record_folder == folder {
                files.push(record);
            } else if let Some(rest) = record_folder.strip_prefix(&prefix) {
                let sub = rest.split('/').next().unwrap_or(rest);
                subfolders.insert(sub.to_string());
            }
        }
        (files, subfolders.into_iter().collect())
    }

    /// Renames every record whose folder path begins with `old_prefix`
    /// (optionally followed by `/`) to start with `new_prefix` instead.
    /// Returns the `(name, node_index)` of every record touched, so the
    /// caller can push `INTERNAL_SET_FOLDER` to the owning Nodes.
    pub async fn rename_folder(&self, old_prefix: &str, new_prefix: &str) -> Vec<(String, usize, String)> {
        let mut root = self.root.write().await;
        let mut all = Vec::new();
        root.collect_mut(&mut all);
        let mut touched = Vec::new();
        for record in all {
            let Some(folder) = &record.folder else { continue };
            let matches = folder == old_prefix || folder.starts_with(&format!("{old_prefix}/"));
            if !matches {
                continue;
            }
            let new_folder = if folder == old_prefix {
                new_prefix.to_string()
            } else {
                format!("{new_prefix}{}", &folder[old_prefix.len()..])
            };
            record.folder = Some(new_folder.clone());
            touched.push((record.name.clone(), record.node_index, new_folder));
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, node: usize, owner: &str) -> FileRecord {
        FileRecord::new(name, node, owner, 0)
    }

    #[tokio::test]
    async fn insert_then_locate_is_idempotent() {
        let trie = FileTrie::new();
        trie.insert(record("a.txt", 2, "alice")).await.unwrap();
        assert_eq!(trie.locate("a.txt").await, Some(2));
        assert_eq!(trie.locate("a.txt").await, Some(2));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let trie = FileTrie::new();
        trie.insert(record("a.txt", 0, "alice")).await.unwrap();
        assert!(trie.insert(record("a.txt", 1, "bob")).await.is_err());
    }

    #[tokio::test]
    async fn delete_requires_ownership() {
        let trie = FileTrie::new();
        trie.insert(record("a.txt", 0, "alice")).await.unwrap();
        assert!(trie.delete("a.txt", "bob").await.is_err());
        assert!(trie.delete("a.txt", "alice").await.is_ok());
        assert_eq!(trie.locate("a.txt").await, None);
    }

    #[tokio::test]
    async fn purge_removes_only_matching_node() {
        let trie = FileTrie::new();
        trie.insert(record("a.txt", 1, "alice")).await.unwrap();
        trie.insert(record("b.txt", 2, "alice")).await.unwrap();
        let removed = trie.purge_by_node(1).await;
        assert_eq!(removed, vec!["a.txt".to_string()]);
        assert_eq!(trie.locate("a.txt").await, None);
        assert_eq!(trie.locate("b.txt").await, Some(2));
    }

    #[tokio::test]
    async fn acl_monotonicity_within_a_session() {
        let trie = FileTrie::new();
        trie.insert(record("a.txt", 0, "alice")).await.unwrap();
        trie.grant("a.txt", "alice", "bob", Permission::Write).await.unwrap();
        assert!(trie.permits("a.txt", "bob", Permission::Read).await.unwrap());
        assert!(trie.permits("a.txt", "bob", Permission::Write).await.unwrap());
    }
}
