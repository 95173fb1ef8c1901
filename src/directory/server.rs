//! The Directory's top-level wiring: the four independently-locked shared
//! regions (spec §5) and the accept loop that multiplexes Client and Node
//! connections by their first frame's type (spec §2).

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::directory::active_users::ActiveUsers;
use crate::directory::cache::LocationCache;
use crate::directory::node_session;
use crate::directory::registry::NodeRegistry;
use crate::directory::session;
use crate::directory::trie::FileTrie;
use crate::error::Result;
use crate::wire::message::MessageType;
use crate::wire::read_frame;

/// Owns the Directory's four independently-locked regions (spec §5: file
/// trie, Node registry, location cache, active-user list).
pub struct Directory {
    pub trie: FileTrie,
    pub cache: LocationCache,
    pub registry: NodeRegistry,
    pub active_users: ActiveUsers,
    pub enable_exec: bool,
}

impl Directory {
    pub fn new(node_capacity: usize, enable_exec: bool) -> Self {
        Self {
            trie: FileTrie::new(),
            cache: LocationCache::default(),
            registry: NodeRegistry::new(node_capacity),
            active_users: ActiveUsers::new(),
            enable_exec,
        }
    }

    /// Dispatches `frame` to the Node at `node_index`, purging it from the
    /// registry and trie on any I/O failure (spec §4.7(a)).
    pub async fn dispatch_node(
        self: &Arc<Self>,
        node_index: usize,
        frame: crate::wire::Frame,
    ) -> Result<crate::wire::Frame> {
        let handle =
            self.registry.handle(node_index).await.ok_or_else(|| crate::error::Error::internal("node is down"))?;
        match handle.dispatch(frame).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(node_index, error = %e, "node dispatch failed, purging");
                purge_node(self, node_index).await;
                Err(e)
            }
        }
    }
}

/// Accepts connections until the listener fails, spawning one detached
/// worker per connection.
pub async fn run(directory: Arc<Directory>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let directory = directory.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(directory, stream).await {
                warn!(%addr, error = %e, "connection ended with an error");
            }
        });
    }
}

async fn handle_connection(directory: Arc<Directory>, mut stream: tokio::net::TcpStream) -> Result<()> {
    let first = read_frame(&mut stream).await?;
    match first.msg_type() {
        MessageType::RegisterClient => session::run(directory, stream, first).await,
        MessageType::Register => node_session::handle(directory, stream, first).await,
        other => Err(crate::error::Error::bad_request(format!(
            "first frame must be REGISTER_CLIENT or REGISTER, got {other:?}"
        ))),
    }
}

/// Node removal (spec §4.7): deactivate the slot and purge every file
/// record it owned from the trie and location cache.
pub async fn purge_node(directory: &Arc<Directory>, node_index: usize) {
    directory.registry.deactivate(node_index).await;
    let purged = directory.trie.purge_by_node(node_index).await;
    for name in &purged {
        directory.cache.invalidate(name);
    }
    info!(node_index, purged = purged.len(), "node purged from registry");
}
