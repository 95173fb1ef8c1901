//! Sentence-level advisory locks (spec §3 "Sentence lock", §4.5).
//!
//! A lock is the triple `(filename, sentence_index, client_id)`. At most
//! one lock exists per `(filename, sentence_index)` at any instant; a
//! client may hold many locks across files and sentences. The reverse
//! index lets a disconnecting worker release every lock it held in one
//! pass, per spec §4.5 ("on any termination path every lock held by the
//! worker is released").

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct Key {
    filename: String,
    sentence: usize,
}

#[derive(Default)]
struct State {
    holders: HashMap<Key, u64>,
    by_client: HashMap<u64, HashSet<Key>>,
}

/// The Node's single sentence-lock list.
#[derive(Default)]
pub struct LockTable {
    state: Mutex<State>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `(filename, sentence)` for `client_id`. Re-entry by the
    /// same client is a no-op; a different client holding it is `ERR_409`.
    pub async fn acquire(&self, filename: &str, sentence: usize, client_id: u64) -> Result<()> {
        let key = Key { filename: filename.to_string(), sentence };
        let mut state = self.state.lock().await;
        match state.holders.get(&key) {
            Some(&holder) if holder == client_id => Ok(()),
            Some(_) => Err(Error::conflict(format!("{filename}:{sentence} is locked by another client"))),
            None => {
                state.holders.insert(key.clone(), client_id);
                state.by_client.entry(client_id).or_default().insert(key);
                Ok(())
            }
        }
    }

    pub async fn is_locked(&self, filename: &str) -> bool {
        let state = self.state.lock().await;
        state.holders.keys().any(|k| k.filename == filename)
    }

    pub async fn release(&self, filename: &str, sentence: usize, client_id: u64) {
        let key = Key { filename: filename.to_string(), sentence };
        let mut state = self.state.lock().await;
        if state.holders.get(&key) == Some(&client_id) {
            state.holders.remove(&key);
        }
        if let Some(set) = state.by_client.get_mut(&client_id) {
            set.remove(&key);
        }
    }

    /// Releases every lock `client_id` holds, across all files.
    pub async fn release_all(&self, client_id: u64) {
        let mut state = self.state.lock().await;
        if let Some(keys) = state.by_client.remove(&client_id) {
            for key in keys {
                state.holders.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_client_conflicts() {
        let table = LockTable::new();
        table.acquire("f.txt", 2, 1).await.unwrap();
        assert!(table.acquire("f.txt", 2, 2).await.is_err());
    }

    #[tokio::test]
    async fn same_client_reentry_is_a_no_op() {
        let table = LockTable::new();
        table.acquire("f.txt", 2, 1).await.unwrap();
        table.acquire("f.txt", 2, 1).await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_releases_every_lock() {
        let table = LockTable::new();
        table.acquire("a.txt", 1, 1).await.unwrap();
        table.acquire("b.txt", 1, 1).await.unwrap();
        table.release_all(1).await;
        assert!(!table.is_locked("a.txt").await);
        assert!(!table.is_locked("b.txt").await);
    }
}
