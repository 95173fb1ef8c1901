//! The Node's public listener: one `client_proto` worker per Client
//! connection (spec §5, mirroring the Directory's `server::run` accept
//! loop).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Result;
use crate::node::client_proto;
use crate::node::server::Node;

pub async fn run(node: Arc<Node>, listener: TcpListener) -> Result<()> {
    info!(ip = %node.ip, port = node.port, "node listening for clients");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to accept client connection");
                continue;
            }
        };
        if !node.running.load(Ordering::Relaxed) {
            info!("node shutting down, closing listener");
            return Ok(());
        }
        if let Err(e) = stream.set_nodelay(true) {
            error!(error = %e, %addr, "failed to set TCP_NODELAY");
        }
        let client_id = node.next_client_id();
        let task_node = node.clone();
        let task = tokio::spawn(async move {
            client_proto::handle(task_node, stream, client_id).await;
        });
        node.open_clients.push((client_id, task.abort_handle()));
    }
}
