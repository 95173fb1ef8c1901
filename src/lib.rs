//! parchment - a distributed, networked text-file store: a central
//! Directory coordinating a dynamic pool of storage Nodes, talked to by
//! Clients over a binary-framed protocol (and, Node-side, a line-based
//! text dialogue).

pub mod client;
pub mod directory;
pub mod domain;
pub mod error;
pub mod node;
pub mod wire;

/// Seconds since the Unix epoch, used for every timestamp the Directory
/// and Node stamp onto file records, journals, and checkpoints.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
