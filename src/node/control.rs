//! The Node's side of the Directory control link: handles
//! Directory-initiated `INTERNAL_*` frames plus the Directory-mediated
//! `CREATE`/`DELETE`/`UNDO` trio (spec §4.2, §6). One dedicated worker
//! owns this link for the Node's whole lifetime (spec §5).

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::domain::acl::Permission;
use crate::domain::file_record::NodeFileRecord;
use crate::error::{Error, Result};
use crate::node::server::Node;
use crate::node::undo;
use crate::wire::message::MessageType;
use crate::wire::payload::{AddAccessPayload, MetadataRespPayload};
use crate::wire::{read_frame, write_frame, Frame};

/// Runs until the control connection fails or the Node is shut down.
pub async fn run(node: std::sync::Arc<Node>, mut stream: TcpStream) {
    loop {
        let frame = tokio::select! {
            result = read_frame(&mut stream) => match result {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "control link to directory failed");
                    return;
                }
            },
            _ = node.shutdown_notify.notified() => {
                info!("closing directory control link on shutdown");
                let _ = stream.shutdown().await;
                return;
            }
        };
        match dispatch(&node, &frame).await {
            Ok(Some(reply)) => {
                if let Err(e) = write_frame(&mut stream, &reply).await {
                    error!(error = %e, "failed to reply to directory");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "control request failed");
                let error_frame = Frame::new(MessageType::Error, 0, 0, "", e.to_string().into_bytes());
                if let Err(io_err) = write_frame(&mut stream, &error_frame).await {
                    error!(error = %io_err, "failed to send error reply to directory");
                    return;
                }
            }
        }
    }
}

async fn dispatch(node: &std::sync::Arc<Node>, frame: &Frame) -> Result<Option<Frame>> {
    let name = frame.name();
    match frame.msg_type() {
        MessageType::InternalRead => {
            let files = node.files.read().await;
            let record = files.get(&name).ok_or_else(|| Error::not_found(&name))?;
            Ok(Some(Frame::new(MessageType::InternalData, 0, 0, &name, record.content.clone().into_bytes())))
        }

        MessageType::InternalGetMetadata => {
            let files = node.files.read().await;
            let record = files.get(&name).ok_or_else(|| Error::not_found(&name))?;
            let payload = MetadataRespPayload {
                word_count: record.stats.word_count as i64,
                char_count: record.stats.char_count as i64,
                created: record.stats.created,
                last_modified: record.stats.modified,
                last_accessed: record.stats.last_accessed,
                last_accessed_by: record.stats.last_accessed_by.clone().unwrap_or_default(),
            }
            .to_bytes();
            Ok(Some(Frame::new(MessageType::InternalMetadataResp, 0, 0, &name, payload)))
        }

        MessageType::InternalAddAccess => {
            let request = AddAccessPayload::from_bytes(&frame.payload).map_err(|e| Error::bad_request(e.to_string()))?;
            {
                let mut files = node.files.write().await;
                let record = files.get_mut(&name).ok_or_else(|| Error::not_found(&name))?;
                record.acl.grant(&request.identity, request.permission).map_err(Error::conflict)?;
            }
            node.persist().await?;
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &name)))
        }

        MessageType::InternalRemAccess => {
            let target = String::from_utf8_lossy(&frame.payload).trim_end_matches('\0').to_string();
            {
                let mut files = node.files.write().await;
                let record = files.get_mut(&name).ok_or_else(|| Error::not_found(&name))?;
                record.acl.revoke(&target);
            }
            node.persist().await?;
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &name)))
        }

        MessageType::InternalSetOwner => {
            let owner = String::from_utf8_lossy(&frame.payload).trim_end_matches('\0').to_string();
            {
                let mut files = node.files.write().await;
                if let Some(record) = files.get_mut(&name) {
                    record.owner = owner;
                }
            }
            node.persist().await?;
            Ok(None)
        }

        MessageType::InternalSetFolder => {
            let folder = String::from_utf8_lossy(&frame.payload).trim_end_matches('\0').to_string();
            {
                let mut files = node.files.write().await;
                if let Some(record) = files.get_mut(&name) {
                    record.folder = if folder.is_empty() { None } else { Some(folder) };
                }
            }
            node.persist().await?;
            Ok(None)
        }

        MessageType::InternalRename => {
            let new_name = String::from_utf8_lossy(&frame.payload).trim_end_matches('\0').to_string();
            {
                let mut files = node.files.write().await;
                let mut record = files.remove(&name).ok_or_else(|| Error::not_found(&name))?;
                record.name = new_name.clone();
                files.insert(new_name.clone(), record);
            }
            let _ = tokio::fs::rename(node.layout.file_path(&name), node.layout.file_path(&new_name)).await;
            node.persist().await?;
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &new_name)))
        }

        MessageType::InternalDelete | MessageType::Delete => {
            node.files.write().await.remove(&name);
            let _ = tokio::fs::remove_file(node.layout.file_path(&name)).await;
            node.persist().await?;
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &name)))
        }

        MessageType::Create => {
            let owner = String::from_utf8_lossy(&frame.payload).trim_end_matches('\0').to_string();
            let now = crate::now_unix();
            let record = NodeFileRecord::new(name.clone(), owner, now);
            node.files.write().await.insert(name.clone(), record);
            node.persist().await?;
            info!(name, "node created file");
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &name)))
        }

        MessageType::Undo => {
            if node.locks.is_locked(&name).await {
                return Err(Error::conflict(format!("{name} has locked sentences")));
            }
            let journal = undo::Journal::new(undo::journal_path(&node.layout.root, &name));
            let backup_name = journal.consume_latest().await?;
            let restored = tokio::fs::read_to_string(node.layout.versions_dir().join(backup_name)).await?;
            let mut files = node.files.write().await;
            let record = files.get_mut(&name).ok_or_else(|| Error::not_found(&name))?;
            record.content = restored;
            record.refresh_counts();
            record.stats.modified = crate::now_unix();
            drop(files);
            node.persist().await?;
            Ok(Some(Frame::empty(MessageType::Ack, 0, 0, &name)))
        }

        other => Err(Error::bad_request(format!("{other:?} is not valid on the control link"))),
    }
}
