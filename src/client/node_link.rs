//! The Client's side of the direct Client↔Node text dialogue (spec §4.1,
//! §4.5): one TCP connection per redirect, torn down when the command
//! completes.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

pub struct NodeLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl NodeLink {
    /// Connects to `(ip, port)` and performs the `USER <identity>`
    /// handshake.
    pub async fn connect(ip: &str, port: i32, identity: &str) -> Result<Self> {
        let stream = TcpStream::connect((ip, port as u16)).await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        writer.write_all(format!("USER {identity}\n").as_bytes()).await?;
        writer.flush().await?;
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if !line.trim().starts_with("OK_200") {
            return Err(Error::internal(format!("node rejected handshake: {}", line.trim())));
        }
        Ok(Self { reader, writer })
    }

    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub async fn recv_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::internal("node closed the connection"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Reads lines until one equals `sentinel`, returning everything in
    /// between.
    pub async fn recv_until(&mut self, sentinel: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await?;
            if line == sentinel {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    pub async fn exit(mut self) {
        let _ = self.send("EXIT").await;
    }
}
