//! On-disk layout for a Node (spec §6 "Persistent state layout"):
//!
//! ```text
//! ss_<port>/
//!   files/              live content, one file per name, plus swap files
//!   metadata/metadata.txt
//!   undo/<file>.undo
//!   versions/           pre-commit backups
//!   checkpoints/        immutable snapshots
//!   checkpoint_meta/<file>.meta
//!   access_requests/<file>.requests
//!   logs/
//! ```

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::domain::acl::{Acl, AclEntry, Permission};
use crate::domain::file_record::{FileStats, NodeFileRecord};
use crate::error::Result;
use crate::node::swap;

pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(port: i32) -> Self {
        Self { root: PathBuf::from(format!("ss_{port}")) }
    }

    /// Same layout, rooted somewhere other than the current directory —
    /// used by tests to run under a `TempDir` instead of `ss_<port>/`.
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata").join("metadata.txt")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.files_dir().join(name)
    }

    /// Creates every subdirectory the layout names.
    pub async fn ensure(&self) -> Result<()> {
        for sub in ["files", "metadata", "undo", "versions", "checkpoints", "checkpoint_meta", "access_requests", "logs"] {
            fs::create_dir_all(self.root.join(sub)).await?;
        }
        Ok(())
    }

    /// Deletes every orphaned `*_<digits>_<digits>.swap` file under
    /// `files/` (spec §9 open question: a leak from worker death that a
    /// Node should clean on its own startup).
    pub async fn cleanup_orphan_swaps(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(self.files_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if swap::is_orphan_swap_name(&name) {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!(name, error = %e, "failed to remove orphan swap file");
                } else {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn escape(field: &str) -> String {
    field.replace(',', "\\,").replace(';', "\\;")
}

fn render_record(name: &str, record: &NodeFileRecord) -> String {
    let last_accessed_by = record.stats.last_accessed_by.as_deref().unwrap_or("-");
    let folder = record.folder.as_deref().unwrap_or("-");
    let acl_entries: Vec<String> = record
        .acl
        .entries()
        .iter()
        .map(|e| format!("{}:{}", escape(&e.identity), e.permission.to_wire()))
        .collect();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        escape(name),
        record.content.len(),
        record.stats.word_count,
        record.stats.created,
        record.stats.modified,
        record.stats.last_accessed,
        last_accessed_by,
        escape(&record.owner),
        folder,
        acl_entries.len(),
        acl_entries.join(";"),
    )
}

fn parse_record(line: &str) -> Option<(String, NodeFileRecord)> {
    let fields: Vec<&str> = line.splitn(11, ',').collect();
    if fields.len() != 11 {
        return None;
    }
    let name = fields[0].to_string();
    let char_count: usize = fields[1].parse().ok()?;
    let word_count: usize = fields[2].parse().ok()?;
    let created: i64 = fields[3].parse().ok()?;
    let modified: i64 = fields[4].parse().ok()?;
    let last_accessed: i64 = fields[5].parse().ok()?;
    let last_accessed_by = if fields[6] == "-" { None } else { Some(fields[6].to_string()) };
    let owner = fields[7].to_string();
    let folder = if fields[8] == "-" { None } else { Some(fields[8].to_string()) };
    let acl_count: usize = fields[9].parse().ok()?;
    let acl = fields[10]
        .split(';')
        .filter(|s| !s.is_empty())
        .take(acl_count)
        .filter_map(|entry| {
            let (identity, perm) = entry.rsplit_once(':')?;
            let permission = Permission::from_wire(perm.parse().ok()?)?;
            Some(AclEntry { identity: identity.to_string(), permission })
        })
        .collect();

    let record = NodeFileRecord {
        name: name.clone(),
        owner,
        folder,
        stats: FileStats { word_count, char_count, created, modified, last_accessed, last_accessed_by },
        acl: Acl::from_entries(acl),
        content: String::new(),
    };
    Some((name, record))
}

/// Loads every record from `metadata.txt`, filling in `content` from
/// `files/<name>`.
pub async fn load_all(layout: &Layout) -> Result<Vec<NodeFileRecord>> {
    let raw = match fs::read_to_string(layout.metadata_path()).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in raw.lines() {
        let Some((name, mut record)) = parse_record(line) else { continue };
        record.content = fs::read_to_string(layout.file_path(&name)).await.unwrap_or_default();
        records.push(record);
    }
    Ok(records)
}

/// Rewrites `metadata.txt` wholesale from the given records rather than
/// patching it in place, since the table is expected to stay small.
pub async fn save_all<'a>(layout: &Layout, records: impl Iterator<Item = (&'a str, &'a NodeFileRecord)>) -> Result<()> {
    let body: String = records.map(|(name, record)| render_record(name, record) + "\n").collect();
    if let Some(parent) = layout.metadata_path().parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(layout.metadata_path(), body).await?;
    Ok(())
}

pub fn backup_path(layout: &Layout, filename: &str, timestamp: i64) -> PathBuf {
    layout.versions_dir().join(format!("{filename}.{timestamp}.bak"))
}
