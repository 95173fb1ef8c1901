//! The Client: authenticates to the Directory over the framed protocol,
//! then for each command either stays on that link or reconnects directly
//! to a Node when redirected (spec §2, §4.6).

pub mod node_link;
pub mod repl;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::domain::acl::Permission;
use crate::error::{Error, Result};
use crate::wire::message::MessageType;
use crate::wire::payload::{AddAccessPayload, AddressPayload};
use crate::wire::{read_frame, write_frame, Frame};

/// A live session on the Client↔Directory framed link.
pub struct DirectoryClient {
    stream: TcpStream,
    ip: String,
    port: u16,
    pub identity: String,
}

impl DirectoryClient {
    /// Connects and performs the `REGISTER_CLIENT` handshake.
    pub async fn connect(ip: &str, port: u16, identity: String) -> Result<Self> {
        let stream = Self::handshake(ip, port, &identity).await?;
        Ok(Self { stream, ip: ip.to_string(), port, identity })
    }

    async fn handshake(ip: &str, port: u16, identity: &str) -> Result<TcpStream> {
        let mut stream = TcpStream::connect((ip, port)).await?;
        let register = Frame::empty(MessageType::RegisterClient, 0, 0, identity);
        write_frame(&mut stream, &register).await?;
        let reply = read_frame(&mut stream).await?;
        if reply.msg_type() == MessageType::Error {
            return Err(Error::unauthorized(String::from_utf8_lossy(&reply.payload).into_owned()));
        }
        info!(%identity, "registered with directory");
        Ok(stream)
    }

    /// Re-establishes the framed link and re-authenticates. The Directory
    /// closes the connection once `EXEC` output is sent (spec §4.4), so a
    /// Client must call this before its next command.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.stream = Self::handshake(&self.ip, self.port, &self.identity).await?;
        Ok(())
    }

    async fn call(&mut self, frame: Frame) -> Result<Frame> {
        write_frame(&mut self.stream, &frame).await?;
        let reply = read_frame(&mut self.stream).await?;
        if reply.msg_type() == MessageType::Error {
            return Err(Error::internal(String::from_utf8_lossy(&reply.payload).into_owned()));
        }
        Ok(reply)
    }

    pub async fn create(&mut self, name: &str) -> Result<()> {
        self.call(Frame::empty(MessageType::Create, 0, 0, name)).await.map(drop)
    }

    pub async fn delete(&mut self, name: &str) -> Result<()> {
        self.call(Frame::empty(MessageType::Delete, 0, 0, name)).await.map(drop)
    }

    /// `UNDO` is Directory-mediated, not a redirect (spec §6's external
    /// interface table groups it with `CREATE`/`DELETE`).
    pub async fn undo(&mut self, name: &str) -> Result<()> {
        self.call(Frame::empty(MessageType::Undo, 0, 0, name)).await.map(drop)
    }

    pub async fn locate(&mut self, name: &str) -> Result<(String, i32)> {
        let reply = self.call(Frame::empty(MessageType::LocateFile, 0, 0, name)).await?;
        address_from(&reply)
    }

    /// Any of the redirect-based content operations: returns the owning
    /// Node's address for the Client to reconnect to directly.
    pub async fn redirect(&mut self, msg_type: MessageType, name: &str) -> Result<(String, i32)> {
        let reply = self.call(Frame::empty(msg_type, 0, 0, name)).await?;
        address_from(&reply)
    }

    pub async fn add_access(&mut self, name: &str, target: &str, permission: Permission) -> Result<()> {
        let payload = AddAccessPayload { identity: target.to_string(), permission }.to_bytes();
        self.call(Frame::new(MessageType::AddAccess, 0, 0, name, payload)).await.map(drop)
    }

    pub async fn rem_access(&mut self, name: &str, target: &str) -> Result<()> {
        self.call(Frame::new(MessageType::RemAccess, 0, 0, name, target.as_bytes().to_vec())).await.map(drop)
    }

    /// Runs `EXEC`, then reconnects since the Directory closes the link
    /// once the output has been sent (spec §4.4).
    pub async fn exec(&mut self, name: &str) -> Result<Vec<u8>> {
        let result = self.call(Frame::empty(MessageType::Exec, 0, 0, name)).await;
        if let Err(e) = self.reconnect().await {
            warn!(error = %e, "failed to reconnect after exec");
        }
        Ok(result?.payload)
    }

    pub async fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.call(Frame::new(MessageType::Rename, 0, 0, old_name, new_name.as_bytes().to_vec())).await.map(drop)
    }

    pub async fn move_folder(&mut self, old_prefix: &str, new_prefix: &str) -> Result<()> {
        self.call(Frame::new(MessageType::MoveFolder, 0, 0, old_prefix, new_prefix.as_bytes().to_vec()))
            .await
            .map(drop)
    }

    pub async fn view(&mut self, folder: Option<&str>, long: bool) -> Result<String> {
        let payload = vec![u8::from(long)];
        let (msg_type, name) = match folder {
            Some(folder) => (MessageType::ViewFolder, folder),
            None => (MessageType::View, ""),
        };
        let reply = self.call(Frame::new(msg_type, 0, 0, name, payload)).await?;
        Ok(String::from_utf8_lossy(&reply.payload).into_owned())
    }

    /// Reports a Node the Client found unreachable on a direct connection
    /// (spec §4.7(b)).
    pub async fn report_dead(&mut self, ip: &str, port: i32) -> Result<()> {
        let payload = AddressPayload { ip: ip.to_string(), port }.to_bytes();
        self.call(Frame::new(MessageType::SsDeadReport, 0, 0, "", payload)).await.map(drop)
    }
}

fn address_from(frame: &Frame) -> Result<(String, i32)> {
    let address = AddressPayload::from_bytes(&frame.payload).map_err(|e| Error::internal(e.to_string()))?;
    Ok((address.ip, address.port))
}
