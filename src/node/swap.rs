//! Swap files: the per-session scratch edit of a sentence (spec §3
//! "Swap file", §4.5 WRITE session). Lives at
//! `<root>/files/<file>_<sentence>_<client_id>.swap` for as long as the
//! owning client holds the corresponding sentence lock.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;

pub fn swap_path(files_dir: &Path, filename: &str, sentence: usize, client_id: u64) -> PathBuf {
    files_dir.join(format!("{filename}_{sentence}_{client_id}.swap"))
}

pub async fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).await?;
    Ok(())
}

pub async fn read(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Matches the orphan-swap naming convention `*_<digits>_<digits>.swap`
/// (spec §9 open question), used by [`crate::node::persistence`]'s
/// startup cleanup.
pub fn is_orphan_swap_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".swap") else { return false };
    let mut parts = stem.rsplitn(3, '_');
    let Some(client_id) = parts.next() else { return false };
    let Some(sentence) = parts.next() else { return false };
    parts.next().is_some() && client_id.chars().all(|c| c.is_ascii_digit()) && !client_id.is_empty()
        && sentence.chars().all(|c| c.is_ascii_digit()) && !sentence.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_orphan_swap_names() {
        assert!(is_orphan_swap_name("a.txt_3_42.swap"));
        assert!(!is_orphan_swap_name("a.txt"));
        assert!(!is_orphan_swap_name("a.txt_three_42.swap"));
    }
}
