//! Per-file checkpoints (spec §3 "Checkpoint set", §4.5 "Checkpoints").
//!
//! A checkpoint is an immutable `(tag → snapshot, metadata)` pair. Tags are
//! unique per file; checkpoints survive everything except the owning
//! file's deletion.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CheckpointMeta {
    pub timestamp: i64,
    pub tag: String,
    pub creator: String,
    pub size: usize,
}

impl CheckpointMeta {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '|');
        let timestamp = fields.next()?.parse().ok()?;
        let tag = fields.next()?.to_string();
        let creator = fields.next()?.to_string();
        let size = fields.next()?.parse().ok()?;
        Some(Self { timestamp, tag, creator, size })
    }

    fn render(&self) -> String {
        format!("{}|{}|{}|{}", self.timestamp, self.tag, self.creator, self.size)
    }
}

pub struct CheckpointSet {
    snapshot_dir: PathBuf,
    meta_path: PathBuf,
}

impl CheckpointSet {
    pub fn new(root: &Path, filename: &str) -> Self {
        Self {
            snapshot_dir: root.join("checkpoints").join(filename),
            meta_path: root.join("checkpoint_meta").join(format!("{filename}.meta")),
        }
    }

    async fn load_meta(&self) -> Result<Vec<CheckpointMeta>> {
        match fs::read_to_string(&self.meta_path).await {
            Ok(content) => Ok(content.lines().filter_map(CheckpointMeta::parse).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_meta(&self, entries: &[CheckpointMeta]) -> Result<()> {
        if let Some(parent) = self.meta_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body: String = entries.iter().map(|e| e.render() + "\n").collect();
        fs::write(&self.meta_path, body).await?;
        Ok(())
    }

    pub async fn create(&self, tag: &str, creator: &str, content: &str, timestamp: i64) -> Result<()> {
        let mut entries = self.load_meta().await?;
        if entries.iter().any(|e| e.tag == tag) {
            return Err(Error::conflict(format!("checkpoint {tag} already exists")));
        }
        fs::create_dir_all(&self.snapshot_dir).await?;
        fs::write(self.snapshot_dir.join(tag), content).await?;
        entries.push(CheckpointMeta { timestamp, tag: tag.to_string(), creator: creator.to_string(), size: content.len() });
        self.save_meta(&entries).await
    }

    pub async fn list(&self) -> Result<Vec<CheckpointMeta>> {
        self.load_meta().await
    }

    pub async fn read(&self, tag: &str) -> Result<String> {
        let entries = self.load_meta().await?;
        if !entries.iter().any(|e| e.tag == tag) {
            return Err(Error::not_found(format!("checkpoint {tag}")));
        }
        Ok(fs::read_to_string(self.snapshot_dir.join(tag)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let set = CheckpointSet::new(dir.path(), "a.txt");
        set.create("v1", "alice", "hello world.", 100).await.unwrap();
        assert_eq!(set.read("v1").await.unwrap(), "hello world.");
        assert_eq!(set.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_tag_conflicts() {
        let dir = tempdir().unwrap();
        let set = CheckpointSet::new(dir.path(), "a.txt");
        set.create("v1", "alice", "one.", 1).await.unwrap();
        assert!(set.create("v1", "alice", "two.", 2).await.is_err());
    }
}
