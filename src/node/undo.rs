//! Per-file undo journal (spec §3 "Undo journal", §4.5 "Undo").
//!
//! An append-only, pipe-delimited text log: `timestamp|backup|user|used`.
//! Undo consumes the most recent unused entry (marks it `used=1`) rather
//! than deleting it, so repeated undo walks further back in time; entries
//! are never removed, only marked, so administrative tooling can still
//! inspect the full history.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub timestamp: i64,
    pub backup: String,
    pub user: String,
    pub used: bool,
}

impl JournalEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '|');
        let timestamp = fields.next()?.parse().ok()?;
        let backup = fields.next()?.to_string();
        let user = fields.next()?.to_string();
        let used = fields.next()? == "1";
        Some(Self { timestamp, backup, user, used })
    }

    fn render(&self) -> String {
        format!("{}|{}|{}|{}", self.timestamp, self.backup, self.user, if self.used { 1 } else { 0 })
    }
}

/// One file's undo journal, read and rewritten wholesale on each mutation
/// (journals are expected to stay small).
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<Vec<JournalEntry>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().filter_map(JournalEntry::parse).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &[JournalEntry]) -> Result<()> {
        let body: String = entries.iter().map(|e| e.render() + "\n").collect();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, body).await?;
        Ok(())
    }

    /// Appends a fresh entry for a just-taken backup, prior to a commit.
    pub async fn append(&self, timestamp: i64, backup: &str, user: &str) -> Result<()> {
        let mut entries = self.load().await?;
        entries.push(JournalEntry { timestamp, backup: backup.to_string(), user: user.to_string(), used: false });
        self.save(&entries).await
    }

    /// Finds the newest unused entry, marks it used, and returns its
    /// backup filename for the caller to restore. Fails with `NotFound`
    /// ("no history") when every entry has been consumed.
    pub async fn consume_latest(&self) -> Result<String> {
        let mut entries = self.load().await?;
        let index = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.used)
            .max_by_key(|(_, e)| e.timestamp)
            .map(|(i, _)| i)
            .ok_or_else(|| Error::not_found("no history"))?;
        entries[index].used = true;
        let backup = entries[index].backup.clone();
        self.save(&entries).await?;
        Ok(backup)
    }
}

pub fn journal_path(root: &Path, filename: &str) -> PathBuf {
    root.join("undo").join(format!("{filename}.undo"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn undo_chain_exhausts_to_no_history() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("f.txt.undo"));
        journal.append(1, "b1", "alice").await.unwrap();
        journal.append(2, "b2", "alice").await.unwrap();
        journal.append(3, "b3", "alice").await.unwrap();

        assert_eq!(journal.consume_latest().await.unwrap(), "b3");
        assert_eq!(journal.consume_latest().await.unwrap(), "b2");
        assert_eq!(journal.consume_latest().await.unwrap(), "b1");
        assert!(journal.consume_latest().await.is_err());
    }
}
