//! Node registry: a fixed-capacity slotted table of active storage Nodes
//! (spec §3 "Node registry entry", §4.2 dispatch, §4.7 failure detection).

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::TcpStream;
use tokio::sync::RwLock;

use crate::directory::node_actor::{self, NodeActorHandle};
use crate::error::{Error, Result};

/// Default slot count: a few dozen is generous for a teaching deployment
/// and keeps round-robin placement cheap to reason about.
pub const DEFAULT_SLOTS: usize = 64;

struct Slot {
    ip: String,
    port: i32,
    actor: NodeActorHandle,
    active: bool,
}

pub struct NodeRegistry {
    slots: RwLock<Vec<Option<Slot>>>,
    cursor: AtomicUsize,
}

impl NodeRegistry {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots: RwLock::new(slots), cursor: AtomicUsize::new(0) }
    }

    /// Registers a Node's control connection in the first free slot.
    /// Rejects a Node re-registering the same `(ip, port)` while its
    /// previous slot is still active.
    pub async fn register(&self, ip: String, port: i32, stream: TcpStream) -> Result<usize> {
        let mut slots = self.slots.write().await;
        if slots.iter().flatten().any(|s| s.active && s.ip == ip && s.port == port) {
            return Err(Error::conflict(format!("{ip}:{port} is already registered")));
        }
        let index = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| Error::internal("node registry is full"))?;
        let (actor, _join) = node_actor::spawn(stream);
        slots[index] = Some(Slot { ip, port, actor, active: true });
        Ok(index)
    }

    pub async fn handle(&self, index: usize) -> Option<NodeActorHandle> {
        let slots = self.slots.read().await;
        slots.get(index).and_then(|s| s.as_ref()).filter(|s| s.active).map(|s| s.actor.clone())
    }

    pub async fn address(&self, index: usize) -> Option<(String, i32)> {
        let slots = self.slots.read().await;
        slots.get(index).and_then(|s| s.as_ref()).filter(|s| s.active).map(|s| (s.ip.clone(), s.port))
    }

    pub async fn find_by_address(&self, ip: &str, port: i32) -> Option<usize> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.as_ref().is_some_and(|s| s.active && s.ip == ip && s.port == port))
            .map(|(i, _)| i)
    }

    /// Deactivates a slot and frees it for reuse, as if the Node had never
    /// registered (spec §4.7: "allowing the Node to re-register later").
    pub async fn deactivate(&self, index: usize) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Picks the next active slot in round-robin order for new-file
    /// placement (spec §4.2: "no attempt is made to balance by size or
    /// file count").
    pub async fn next_placement(&self) -> Result<usize> {
        let slots = self.slots.read().await;
        let len = slots.len();
        if len == 0 {
            return Err(Error::internal("no nodes registered"));
        }
        for offset in 0..len {
            let index = (self.cursor.fetch_add(1, Ordering::Relaxed) + offset) % len;
            if slots[index].as_ref().is_some_and(|s| s.active) {
                return Ok(index);
            }
        }
        Err(Error::internal("no active nodes to place a file on"))
    }

    pub async fn active_count(&self) -> usize {
        let slots = self.slots.read().await;
        slots.iter().flatten().filter(|s| s.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slots_start_empty() {
        let registry = NodeRegistry::new(4);
        assert_eq!(registry.active_count().await, 0);
        assert!(registry.next_placement().await.is_err());
    }
}
