//! The Directory's Client↔Directory framed session loop (spec §4.6).
//!
//! One task per Client connection (spec §5: "the Directory spawns one
//! worker per accepted connection and detaches it"). The session starts
//! with `REGISTER_CLIENT` (read by the caller before `run` is invoked) and
//! loops on framed messages until disconnect, at which point the identity
//! is removed from the active set.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::directory::exec;
use crate::directory::server::Directory;
use crate::domain::acl::Permission;
use crate::error::{Error, Result};
use crate::wire::message::MessageType;
use crate::wire::payload::{AddAccessPayload, AddressPayload};
use crate::wire::{read_frame, write_frame, Frame};

/// Runs the Client session until disconnect or a fatal I/O error.
pub async fn run(directory: Arc<Directory>, mut stream: TcpStream, first: Frame) -> Result<()> {
    if first.msg_type() != MessageType::RegisterClient {
        return Err(Error::bad_request("expected REGISTER_CLIENT as the first frame"));
    }
    let identity = first.name();
    if identity.is_empty() {
        return Err(Error::bad_request("REGISTER_CLIENT carried no identity"));
    }
    directory.active_users.login(&identity).await;
    info!(%identity, "client registered");
    write_frame(&mut stream, &Frame::empty(MessageType::Ack, 0, 0, "")).await?;

    let result = serve(&directory, &mut stream, &identity).await;
    directory.active_users.logout(&identity).await;
    info!(%identity, "client disconnected");
    result
}

async fn serve(directory: &Arc<Directory>, stream: &mut TcpStream, identity: &str) -> Result<()> {
    loop {
        let frame = match read_frame(stream).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let is_exec = frame.msg_type() == MessageType::Exec;

        let reply = match dispatch(directory, identity, &frame).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%identity, error = %e, "client request failed");
                Frame::new(MessageType::Error, 0, 0, &e.to_string(), Vec::new())
            }
        };
        write_frame(stream, &reply).await?;

        // spec §4.4: the Client↔Directory connection is closed at end of
        // EXEC output; the Client must reconnect and re-register.
        if is_exec {
            return Ok(());
        }
    }
}

async fn dispatch(directory: &Arc<Directory>, identity: &str, frame: &Frame) -> Result<Frame> {
    match frame.msg_type() {
        MessageType::Create => create(directory, identity, &frame.name()).await,
        MessageType::Delete => delete(directory, identity, &frame.name()).await,
        MessageType::Undo => forward_to_owner(directory, identity, &frame.name(), MessageType::Undo).await,

        MessageType::LocateFile => locate(directory, &frame.name()).await,
        MessageType::Read => redirect(directory, identity, &frame.name(), Permission::Read).await,
        MessageType::Stream => redirect(directory, identity, &frame.name(), Permission::Read).await,
        MessageType::ViewCheckpoint => redirect(directory, identity, &frame.name(), Permission::Read).await,
        MessageType::ListCheckpoints => redirect(directory, identity, &frame.name(), Permission::Read).await,
        MessageType::Write => redirect(directory, identity, &frame.name(), Permission::Write).await,
        MessageType::Checkpoint => redirect(directory, identity, &frame.name(), Permission::Write).await,
        MessageType::Revert => redirect(directory, identity, &frame.name(), Permission::Write).await,

        MessageType::AddAccess => add_access(directory, identity, &frame.name(), &frame.payload).await,
        MessageType::RemAccess => rem_access(directory, identity, &frame.name(), &frame.payload).await,

        MessageType::View => crate::directory::listing::view(directory, None, &frame.payload).await,
        MessageType::ViewFolder => {
            crate::directory::listing::view(directory, Some(frame.name()), &frame.payload).await
        }

        MessageType::Exec => exec_file(directory, identity, &frame.name()).await,

        MessageType::SsDeadReport => dead_report(directory, &frame.payload).await,

        MessageType::Rename => rename(directory, identity, &frame.name(), &frame.payload).await,
        MessageType::MoveFolder => move_folder(directory, &frame.name(), &frame.payload).await,

        other => Err(Error::bad_request(format!("{other:?} is not valid on the client session"))),
    }
}

async fn create(directory: &Arc<Directory>, identity: &str, name: &str) -> Result<Frame> {
    if directory.trie.locate(name).await.is_some() {
        return Err(Error::conflict(format!("{name} already exists")));
    }
    let node_index = directory.registry.next_placement().await?;
    let request = Frame::new(MessageType::Create, 0, 0, name, identity.as_bytes().to_vec());
    directory.dispatch_node(node_index, request).await?;

    let now = crate::now_unix();
    let record = crate::domain::file_record::FileRecord::new(name, node_index, identity, now);
    directory.trie.insert(record).await?;
    directory.cache.insert(name, node_index);
    Ok(Frame::empty(MessageType::Ack, 0, 0, name))
}

async fn delete(directory: &Arc<Directory>, identity: &str, name: &str) -> Result<Frame> {
    let record = directory.trie.delete(name, identity).await?;
    directory.cache.invalidate(name);
    let request = Frame::empty(MessageType::Delete, 0, 0, name);
    if let Err(e) = directory.dispatch_node(record.node_index, request).await {
        warn!(name, error = %e, "node refused delete, keeping directory as source of truth");
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, name))
}

/// `UNDO`: requires write permission, forwarded to the owning Node for it
/// to apply against its journal (spec §6 table: `CREATE/DELETE/UNDO` are
/// Directory-mediated, not redirected).
async fn forward_to_owner(
    directory: &Arc<Directory>,
    identity: &str,
    name: &str,
    msg_type: MessageType,
) -> Result<Frame> {
    if !directory.trie.permits(name, identity, Permission::Write).await? {
        return Err(Error::unauthorized(format!("{identity} may not modify {name}")));
    }
    let node_index = directory.trie.locate(name).await.ok_or_else(|| Error::not_found(name))?;
    directory.dispatch_node(node_index, Frame::empty(msg_type, 0, 0, name)).await
}

async fn locate(directory: &Arc<Directory>, name: &str) -> Result<Frame> {
    let node_index = resolve_location(directory, name).await?;
    let (ip, port) = directory.registry.address(node_index).await.ok_or_else(|| Error::internal("node is down"))?;
    let payload = AddressPayload { ip, port }.to_bytes();
    Ok(Frame::new(MessageType::LocateResponse, 0, 0, name, payload))
}

/// Redirects the Client to the owning Node after a permission check (spec
/// §4.6 lists `LOCATE_FILE` as the sole exception that bypasses this).
async fn redirect(directory: &Arc<Directory>, identity: &str, name: &str, requested: Permission) -> Result<Frame> {
    if !directory.trie.permits(name, identity, requested).await? {
        return Err(Error::unauthorized(format!("{identity} may not access {name}")));
    }
    let node_index = resolve_location(directory, name).await?;
    let (ip, port) = directory.registry.address(node_index).await.ok_or_else(|| Error::internal("node is down"))?;
    let payload = AddressPayload { ip, port }.to_bytes();
    Ok(Frame::new(MessageType::ReadRedirect, 0, 0, name, payload))
}

async fn resolve_location(directory: &Arc<Directory>, name: &str) -> Result<usize> {
    if let Some(cached) = directory.cache.get(name) {
        return Ok(cached);
    }
    let node_index = directory.trie.locate(name).await.ok_or_else(|| Error::not_found(name))?;
    directory.cache.insert(name, node_index);
    Ok(node_index)
}

async fn add_access(directory: &Arc<Directory>, identity: &str, name: &str, payload: &[u8]) -> Result<Frame> {
    let request = AddAccessPayload::from_bytes(payload).map_err(|e| Error::bad_request(e.to_string()))?;
    directory.trie.grant(name, identity, &request.identity, request.permission).await?;
    if let Some(node_index) = directory.trie.locate(name).await {
        let frame = Frame::new(MessageType::InternalAddAccess, 0, 0, name, payload.to_vec());
        directory.dispatch_node(node_index, frame).await?;
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, name))
}

async fn rem_access(directory: &Arc<Directory>, identity: &str, name: &str, payload: &[u8]) -> Result<Frame> {
    let target = String::from_utf8_lossy(payload).trim_end_matches('\0').to_string();
    directory.trie.revoke(name, identity, &target).await?;
    if let Some(node_index) = directory.trie.locate(name).await {
        let frame = Frame::new(MessageType::InternalRemAccess, 0, 0, name, payload.to_vec());
        directory.dispatch_node(node_index, frame).await?;
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, name))
}

async fn exec_file(directory: &Arc<Directory>, identity: &str, name: &str) -> Result<Frame> {
    let output = exec::exec_file(directory, identity, directory.enable_exec, name).await?;
    Ok(Frame::new(MessageType::Ack, 0, 0, name, output))
}

async fn dead_report(directory: &Arc<Directory>, payload: &[u8]) -> Result<Frame> {
    let address = AddressPayload::from_bytes(payload).map_err(|e| Error::bad_request(e.to_string()))?;
    if let Some(node_index) = directory.registry.find_by_address(&address.ip, address.port).await {
        crate::directory::server::purge_node(directory, node_index).await;
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, ""))
}

/// Renames a single file. `payload` is the new name's raw UTF-8 bytes (this
/// implementation's own convention — there is no cross-Node interop
/// requirement to match here, unlike the fixed binary header).
async fn rename(directory: &Arc<Directory>, identity: &str, old_name: &str, payload: &[u8]) -> Result<Frame> {
    let new_name = String::from_utf8_lossy(payload).trim_end_matches('\0').to_string();
    if directory.trie.owner_of(old_name).await.as_deref() != Some(identity) {
        return Err(Error::unauthorized(format!("{identity} does not own {old_name}")));
    }
    let mut record = directory.trie.delete(old_name, identity).await?;
    record.name = new_name.clone();
    let node_index = record.node_index;
    directory.trie.insert(record).await?;
    directory.cache.invalidate(old_name);
    directory.cache.insert(&new_name, node_index);

    let frame = Frame::new(MessageType::InternalRename, 0, 0, old_name, new_name.clone().into_bytes());
    if let Err(e) = directory.dispatch_node(node_index, frame).await {
        warn!(old_name, new_name, error = %e, "failed to propagate rename to node");
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, &new_name))
}

async fn move_folder(directory: &Arc<Directory>, old_prefix: &str, payload: &[u8]) -> Result<Frame> {
    let new_prefix = String::from_utf8_lossy(payload).trim_end_matches('\0').to_string();
    let touched = directory.trie.rename_folder(old_prefix, &new_prefix).await;
    for (name, node_index, new_folder) in touched {
        if let Some(handle) = directory.registry.handle(node_index).await {
            let frame = Frame::new(MessageType::InternalSetFolder, 0, 0, &name, new_folder.into_bytes());
            if let Err(e) = handle.notify(frame).await {
                warn!(name, error = %e, "failed to propagate folder move to node");
            }
        }
    }
    Ok(Frame::empty(MessageType::Ack, 0, 0, old_prefix))
}
