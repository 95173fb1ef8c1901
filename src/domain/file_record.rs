//! File records, as held by the Directory (metadata only) and the Node
//! (metadata plus authoritative content) — spec §3.

use crate::domain::acl::Acl;

/// Cached word/character/time statistics tracked on both sides.
#[derive(Debug, Clone, Default)]
pub struct FileStats {
    pub word_count: usize,
    pub char_count: usize,
    pub created: i64,
    pub modified: i64,
    pub last_accessed: i64,
    pub last_accessed_by: Option<String>,
}

/// The Directory's in-memory view of a file: metadata only, no content.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub name: String,
    pub node_index: usize,
    pub owner: String,
    pub folder: Option<String>,
    pub stats: FileStats,
    pub acl: Acl,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, node_index: usize, owner: impl Into<String>, now: i64) -> Self {
        let owner = owner.into();
        Self {
            name: name.into(),
            node_index,
            owner,
            folder: None,
            stats: FileStats { created: now, modified: now, last_accessed: now, ..Default::default() },
            acl: Acl::new(),
        }
    }

    /// Permission check: owner always succeeds; otherwise the ACL decides.
    pub fn permits(&self, identity: &str, requested: crate::domain::acl::Permission) -> bool {
        if identity == self.owner {
            return true;
        }
        self.acl.check(identity, requested)
    }
}

/// The Node's authoritative on-disk record: the same fields as
/// [`FileRecord`] plus the live textual content.
#[derive(Debug, Clone)]
pub struct NodeFileRecord {
    pub name: String,
    pub owner: String,
    pub folder: Option<String>,
    pub stats: FileStats,
    pub acl: Acl,
    pub content: String,
}

impl NodeFileRecord {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, now: i64) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            folder: None,
            stats: FileStats { created: now, modified: now, last_accessed: now, ..Default::default() },
            acl: Acl::new(),
            content: String::new(),
        }
    }

    pub fn permits(&self, identity: &str, requested: crate::domain::acl::Permission) -> bool {
        if identity == self.owner {
            return true;
        }
        self.acl.check(identity, requested)
    }

    pub fn refresh_counts(&mut self) {
        let sentences = crate::domain::sentence::split_sentences(&self.content);
        self.stats.word_count = sentences.iter().map(|s| s.words.len()).sum();
        self.stats.char_count = self.content.chars().count();
    }

    pub fn to_directory_record(&self, node_index: usize) -> FileRecord {
        FileRecord {
            name: self.name.clone(),
            node_index,
            owner: self.owner.clone(),
            folder: self.folder.clone(),
            stats: self.stats.clone(),
            acl: self.acl.clone(),
        }
    }
}
