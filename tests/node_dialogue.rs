//! Exercises a bare Node's Client-facing text dialogue directly, without a
//! Directory in front of it — CREATE, an open WRITE session with multiple
//! word-inserts, commit, and READ back.

use std::sync::Arc;

use parchment::node::persistence::Layout;
use parchment::node::server::Node;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

struct Link {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Link {
    async fn connect(addr: std::net::SocketAddr, identity: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to node");
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        writer.write_all(format!("USER {identity}\n").as_bytes()).await.unwrap();
        writer.flush().await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("OK_200"), "handshake rejected: {line}");
        Self { reader, writer }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    async fn recv_until(&mut self, sentinel: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await;
            if line == sentinel {
                return lines;
            }
            lines.push(line);
        }
    }
}

async fn spawn_node() -> (Arc<Node>, std::net::SocketAddr, TempDir) {
    let tempdir = TempDir::new().expect("create temp dir");
    let layout = Layout::at(tempdir.path().to_path_buf());
    let node = Arc::new(Node::with_layout("127.0.0.1".to_string(), 0, layout));
    node.layout.ensure().await.expect("create node layout");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let spawned = node.clone();
    tokio::spawn(async move {
        let _ = parchment::node::listener::run(spawned, listener).await;
    });
    (node, addr, tempdir)
}

#[tokio::test]
async fn create_write_commit_and_read_round_trip() {
    let (_node, addr, _tempdir) = spawn_node().await;
    let mut link = Link::connect(addr, "alice").await;

    link.send("CREATE report.txt").await;
    assert!(link.recv().await.starts_with("OK_200"));

    link.send("WRITE report.txt 1").await;
    assert!(link.recv().await.starts_with("OK_200"));
    link.send("1 Hello world").await;
    assert!(link.recv().await.starts_with("OK_200"));
    link.send("3 there.").await;
    assert!(link.recv().await.starts_with("OK_200"));
    link.send("ETIRW").await;
    assert!(link.recv().await.starts_with("OK_200"));

    link.send("READ report.txt").await;
    let status = link.recv().await;
    assert!(status.contains("FILE_CONTENT"), "got: {status}");
    let content = link.recv_until("END_OF_FILE").await;
    assert_eq!(content.join(" "), "Hello world there.");

    link.send("EXIT").await;
}

#[tokio::test]
async fn word_inserts_within_one_write_session_accumulate() {
    let (_node, addr, _tempdir) = spawn_node().await;
    let mut link = Link::connect(addr, "alice").await;

    link.send("CREATE notes.txt").await;
    link.recv().await;

    link.send("WRITE notes.txt 1").await;
    link.recv().await;
    link.send("1 one").await;
    link.recv().await;
    link.send("2 two").await;
    link.recv().await;
    link.send("3 three.").await;
    link.recv().await;
    link.send("ETIRW").await;
    link.recv().await;

    link.send("READ notes.txt").await;
    link.recv().await;
    let content = link.recv_until("END_OF_FILE").await;
    assert_eq!(content.join(" "), "one two three.");

    link.send("EXIT").await;
}

#[tokio::test]
async fn checkpoint_then_revert_restores_tagged_content() {
    let (_node, addr, _tempdir) = spawn_node().await;
    let mut link = Link::connect(addr, "alice").await;

    link.send("CREATE plan.txt").await;
    link.recv().await;
    link.send("WRITE plan.txt 1").await;
    link.recv().await;
    link.send("1 draft one.").await;
    link.recv().await;
    link.send("ETIRW").await;
    link.recv().await;

    link.send("CHECKPOINT plan.txt v1").await;
    assert!(link.recv().await.starts_with("OK_200"));

    link.send("WRITE plan.txt 2").await;
    link.recv().await;
    link.send("1 draft two.").await;
    link.recv().await;
    link.send("ETIRW").await;
    link.recv().await;

    link.send("REVERT plan.txt v1").await;
    assert!(link.recv().await.starts_with("OK_200"));

    link.send("READ plan.txt").await;
    link.recv().await;
    let content = link.recv_until("END_OF_FILE").await;
    assert_eq!(content.join(" "), "draft one.");

    link.send("EXIT").await;
}

#[tokio::test]
async fn delete_is_owner_only() {
    let (_node, addr, _tempdir) = spawn_node().await;

    let mut owner = Link::connect(addr, "alice").await;
    owner.send("CREATE secret.txt").await;
    owner.recv().await;
    owner.send("EXIT").await;

    let mut intruder = Link::connect(addr, "mallory").await;
    intruder.send("DELETE secret.txt").await;
    let reply = intruder.recv().await;
    assert!(!reply.starts_with("OK_200"), "non-owner delete should be refused: {reply}");
    intruder.send("EXIT").await;
}
