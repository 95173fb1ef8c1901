//! End-to-end flow through a real Directory and a real Node: registration,
//! `CREATE`/redirect/`WRITE`/`READ` over both links, an access grant, and
//! a rename that must still be servable by the Node afterwards.

use std::sync::Arc;
use std::time::Duration;

use parchment::client::node_link::NodeLink;
use parchment::client::DirectoryClient;
use parchment::directory::registry::DEFAULT_SLOTS;
use parchment::directory::server::Directory;
use parchment::domain::acl::Permission;
use parchment::node::persistence::Layout;
use parchment::node::server::{self, Node};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn spawn_directory() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind directory");
    let addr = listener.local_addr().unwrap();
    let directory = Arc::new(Directory::new(DEFAULT_SLOTS, false));
    tokio::spawn(async move {
        let _ = parchment::directory::server::run(directory, listener).await;
    });
    addr
}

async fn spawn_node(directory_addr: std::net::SocketAddr) -> (std::net::SocketAddr, TempDir) {
    let tempdir = TempDir::new().expect("create temp dir");
    let layout = Layout::at(tempdir.path().to_path_buf());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind node");
    let node_addr = listener.local_addr().unwrap();
    let node = Arc::new(Node::with_layout("127.0.0.1".to_string(), node_addr.port() as i32, layout));
    tokio::spawn(async move {
        let _ = server::run(node, listener, ("127.0.0.1".to_string(), directory_addr.port())).await;
    });
    // Give the node a moment to finish its REGISTER/ACK/REGISTER_COMPLETE handshake.
    tokio::time::sleep(Duration::from_millis(100)).await;
    (node_addr, tempdir)
}

#[tokio::test]
async fn create_write_read_through_directory_redirect() {
    let directory_addr = spawn_directory().await;
    let _node = spawn_node(directory_addr).await;

    let mut client = DirectoryClient::connect("127.0.0.1", directory_addr.port(), "alice".to_string())
        .await
        .expect("register with directory");

    client.create("story.txt").await.expect("create");

    let (ip, port) = client.redirect(parchment::wire::MessageType::Write, "story.txt").await.expect("write redirect");
    let mut link = NodeLink::connect(&ip, port, "alice").await.expect("connect to node");
    link.send("WRITE story.txt 1").await.unwrap();
    link.recv_line().await.unwrap();
    link.send("1 Once upon a time.").await.unwrap();
    link.recv_line().await.unwrap();
    link.send("ETIRW").await.unwrap();
    link.recv_line().await.unwrap();
    link.exit().await;

    let (ip, port) = client.redirect(parchment::wire::MessageType::Read, "story.txt").await.expect("read redirect");
    let mut link = NodeLink::connect(&ip, port, "alice").await.expect("connect to node");
    link.send("READ story.txt").await.unwrap();
    let status = link.recv_line().await.unwrap();
    assert!(status.contains("FILE_CONTENT"));
    let body = link.recv_until("END_OF_FILE").await.unwrap();
    assert_eq!(body.join(" "), "Once upon a time.");
    link.exit().await;
}

#[tokio::test]
async fn unauthorized_reader_is_refused_by_directory() {
    let directory_addr = spawn_directory().await;
    let _node = spawn_node(directory_addr).await;

    let mut owner = DirectoryClient::connect("127.0.0.1", directory_addr.port(), "alice".to_string())
        .await
        .expect("register owner");
    owner.create("diary.txt").await.expect("create");

    let mut stranger = DirectoryClient::connect("127.0.0.1", directory_addr.port(), "mallory".to_string())
        .await
        .expect("register stranger");
    let result = stranger.redirect(parchment::wire::MessageType::Read, "diary.txt").await;
    assert!(result.is_err(), "stranger should not be redirected without read access");

    owner.add_access("diary.txt", "mallory", Permission::Read).await.expect("grant access");
    let (ip, port) = stranger.redirect(parchment::wire::MessageType::Read, "diary.txt").await.expect("now redirects");
    let mut link = NodeLink::connect(&ip, port, "mallory").await.expect("connect");
    link.send("READ diary.txt").await.unwrap();
    let status = link.recv_line().await.unwrap();
    assert!(status.contains("EMPTY_FILE"), "got: {status}");
    link.exit().await;
}

#[tokio::test]
async fn rename_keeps_file_reachable_on_its_node() {
    let directory_addr = spawn_directory().await;
    let _node = spawn_node(directory_addr).await;

    let mut client = DirectoryClient::connect("127.0.0.1", directory_addr.port(), "alice".to_string())
        .await
        .expect("register with directory");
    client.create("old_name.txt").await.expect("create");
    client.rename("old_name.txt", "new_name.txt").await.expect("rename");

    let (ip, port) =
        client.redirect(parchment::wire::MessageType::Read, "new_name.txt").await.expect("redirect to new name");
    let mut link = NodeLink::connect(&ip, port, "alice").await.expect("connect to node");
    link.send("READ new_name.txt").await.unwrap();
    let status = link.recv_line().await.unwrap();
    assert!(status.contains("EMPTY_FILE"), "node should still know the file under its new name: {status}");
    link.exit().await;
}
