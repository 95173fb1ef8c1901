//! The Node's top-level wiring (spec §2, §5): the shared file table and
//! sentence-lock list, a control-link connection to the Directory, and a
//! public listener accepting direct Client connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, RwLock};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::domain::file_record::NodeFileRecord;
use crate::error::Result;
use crate::node::control;
use crate::node::listener;
use crate::node::persistence::{self, Layout};
use crate::wire::message::MessageType;
use crate::wire::payload::{AddressPayload, FileRecordWire};
use crate::wire::{read_frame, write_frame, Frame};

/// The Node's shared, lock-protected state.
pub struct Node {
    pub layout: Layout,
    pub files: RwLock<HashMap<String, NodeFileRecord>>,
    pub locks: crate::node::locks::LockTable,
    pub ip: String,
    pub port: i32,
    /// `(client_id, abort handle)` for every accepted Client socket, so a
    /// shutdown can forcibly tear them all down (spec §5 "Resource
    /// lifetime").
    pub open_clients: SegQueue<(u64, AbortHandle)>,
    next_client_id: AtomicU64,
    pub running: AtomicBool,
    pub shutdown_notify: Notify,
}

impl Node {
    pub fn new(ip: String, port: i32) -> Self {
        Self::with_layout(ip, port, Layout::new(port))
    }

    /// Same as [`Node::new`] but with an explicit [`Layout`] root — lets
    /// tests point a Node at a `TempDir` instead of `ss_<port>/`.
    pub fn with_layout(ip: String, port: i32, layout: Layout) -> Self {
        Self {
            layout,
            files: RwLock::new(HashMap::new()),
            locks: crate::node::locks::LockTable::new(),
            ip,
            port,
            open_clients: SegQueue::new(),
            next_client_id: AtomicU64::new(1),
            running: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
        }
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn persist(&self) -> Result<()> {
        let files = self.files.read().await;
        persistence::save_all(&self.layout, files.iter().map(|(k, v)| (k.as_str(), v))).await
    }

    async fn load_from_disk(&self) -> Result<()> {
        let records = persistence::load_all(&self.layout).await?;
        let mut files = self.files.write().await;
        for record in records {
            files.insert(record.name.clone(), record);
        }
        Ok(())
    }

    /// SIGINT path (spec §5): clears the running flag, closes the
    /// Directory control link, force-aborts every open Client connection,
    /// and self-connects once to unblock the listener's `accept()`.
    pub async fn shutdown(self: &Arc<Self>) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
        while let Some((_, abort)) = self.open_clients.pop() {
            abort.abort();
        }
        if let Ok(stream) = TcpStream::connect((self.ip.as_str(), self.port as u16)).await {
            drop(stream);
        }
    }
}

/// Connects to the Directory, runs the `REGISTER`/sync handshake, then
/// keeps the control link alive for Directory-initiated requests (spec
/// §4.2, §5).
pub async fn run(node: Arc<Node>, listener_socket: TcpListener, directory_addr: (String, u16)) -> Result<()> {
    node.layout.ensure().await?;
    let orphaned = node.layout.cleanup_orphan_swaps().await?;
    if orphaned > 0 {
        info!(orphaned, "removed orphan swap files from a previous run");
    }
    node.load_from_disk().await?;

    let control_stream = register_with_directory(&node, &directory_addr).await?;
    let control_node = node.clone();
    tokio::spawn(async move {
        control::run(control_node, control_stream).await;
    });

    listener::run(node, listener_socket).await
}

async fn register_with_directory(node: &Arc<Node>, directory_addr: &(String, u16)) -> Result<TcpStream> {
    let mut stream = TcpStream::connect((directory_addr.0.as_str(), directory_addr.1)).await?;

    let address = AddressPayload { ip: node.ip.clone(), port: node.port };
    let register = Frame::new(MessageType::Register, 0, 0, "", address.to_bytes());
    write_frame(&mut stream, &register).await?;

    let ack = read_frame(&mut stream).await?;
    if ack.msg_type() == MessageType::Error {
        warn!(text = %String::from_utf8_lossy(&ack.payload), "directory rejected registration");
        return Err(crate::error::Error::conflict("directory rejected node registration"));
    }

    let files = node.files.read().await;
    for (name, record) in files.iter() {
        let wire = FileRecordWire::from_record(&record.to_directory_record(0));
        let frame = Frame::new(MessageType::RegisterFile, 0, 0, name, wire.to_bytes());
        write_frame(&mut stream, &frame).await?;
    }
    drop(files);

    write_frame(&mut stream, &Frame::empty(MessageType::RegisterComplete, 0, 0, "")).await?;
    info!(ip = %node.ip, port = node.port, "registered with directory");
    Ok(stream)
}
