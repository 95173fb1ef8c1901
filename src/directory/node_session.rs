//! Node registration and sync phase (spec §4.2): `REGISTER` →
//! `(ip, port)` duplicate check → `ACK` → zero or more `REGISTER_FILE`
//! frames → `REGISTER_COMPLETE`. Once the sync phase finishes, the control
//! connection is handed to [`crate::directory::node_actor`] for later
//! request/response dispatch.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::info;

use crate::directory::server::Directory;
use crate::domain::file_record::FileRecord;
use crate::error::{Error, Result};
use crate::wire::message::MessageType;
use crate::wire::payload::{AddressPayload, FileRecordWire};
use crate::wire::{read_frame, write_frame, Frame};

pub async fn handle(directory: Arc<Directory>, mut stream: TcpStream, first: Frame) -> Result<()> {
    if first.msg_type() != MessageType::Register {
        return Err(Error::bad_request("expected REGISTER as the first frame"));
    }
    let address = AddressPayload::from_bytes(&first.payload).map_err(|e| Error::bad_request(e.to_string()))?;

    if directory.registry.find_by_address(&address.ip, address.port).await.is_some() {
        let error = Frame::new(MessageType::Error, 0, 0, "", b"duplicate node registration".to_vec());
        write_frame(&mut stream, &error).await?;
        return Err(Error::conflict(format!("{}:{} is already registered", address.ip, address.port)));
    }
    write_frame(&mut stream, &Frame::empty(MessageType::Ack, 0, 0, "")).await?;

    let mut records = Vec::new();
    loop {
        let frame = read_frame(&mut stream).await?;
        match frame.msg_type() {
            MessageType::RegisterFile => {
                let wire = FileRecordWire::from_bytes(&frame.payload).map_err(|e| Error::bad_request(e.to_string()))?;
                records.push(wire);
            }
            MessageType::RegisterComplete => break,
            other => return Err(Error::bad_request(format!("unexpected {other:?} during node sync"))),
        }
    }

    let node_index = directory.registry.register(address.ip.clone(), address.port, stream).await?;
    for wire in &records {
        let mut record = FileRecord::new(wire.filename.clone(), node_index, wire.owner.clone(), wire.created);
        record.folder = wire.folder.clone();
        record.stats.word_count = wire.word_count as usize;
        record.stats.char_count = wire.char_count as usize;
        record.stats.modified = wire.modified;
        record.stats.last_accessed = wire.last_accessed;
        record.stats.last_accessed_by =
            if wire.last_accessed_by.is_empty() { None } else { Some(wire.last_accessed_by.clone()) };
        record.acl = wire.acl();
        directory.trie.rebuild_insert(record).await;
        directory.cache.insert(&wire.filename, node_index);
    }

    info!(ip = %address.ip, port = address.port, node_index, files = records.len(), "node registered");
    Ok(())
}
