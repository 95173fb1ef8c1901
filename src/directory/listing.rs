//! `VIEW`/`VIEWFOLDER` listing (spec §4.3): a printable table of the
//! top-level, or a named folder's immediate, files and subfolders.
//!
//! The "long" flag refreshes per-file statistics first. This implementation
//! batches that refresh by Node and fires the `INTERNAL_GET_METADATA`
//! calls concurrently (spec §9: the long-listing refresh "should batch by
//! Node and parallelise" instead of serialising under the trie lock).

use std::collections::HashMap;
use std::sync::Arc;

use crate::directory::server::Directory;
use crate::domain::file_record::FileRecord;
use crate::error::Result;
use crate::wire::message::MessageType;
use crate::wire::payload::MetadataRespPayload;
use crate::wire::Frame;

/// `payload[0] != 0` requests the long form (this implementation's own
/// convention for the flag byte carried in the `VIEW`/`VIEWFOLDER` frame).
fn is_long(payload: &[u8]) -> bool {
    payload.first().copied().unwrap_or(0) != 0
}

pub async fn view(directory: &Arc<Directory>, folder: Option<String>, payload: &[u8]) -> Result<Frame> {
    let (mut files, subfolders) = match &folder {
        None => directory.trie.list_top_level().await,
        Some(folder) => directory.trie.list_folder(folder).await,
    };

    if is_long(payload) {
        refresh_statistics(directory, &mut files).await;
    }

    let mut lines = Vec::with_capacity(files.len() + subfolders.len());
    for name in &subfolders {
        lines.push(format!("D {name:<32} {:>8} {:>8} {:>20} {}", "-", "-", "-", "-"));
    }
    for record in &files {
        lines.push(format!(
            "F {:<32} {:>8} {:>8} {:>20} {}",
            record.name, record.stats.word_count, record.stats.char_count, record.stats.last_accessed, record.owner
        ));
    }

    let reply_type = if folder.is_some() { MessageType::ViewResponse } else { MessageType::ListResponse };
    Ok(Frame::new(reply_type, 0, 0, "", lines.join("\n").into_bytes()))
}

async fn refresh_statistics(directory: &Arc<Directory>, files: &mut [FileRecord]) {
    let mut by_node: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, record) in files.iter().enumerate() {
        by_node.entry(record.node_index).or_default().push(i);
    }

    let mut tasks = Vec::with_capacity(by_node.len());
    for (node_index, indices) in by_node {
        let Some(handle) = directory.registry.handle(node_index).await else { continue };
        let names: Vec<String> = indices.iter().map(|&i| files[i].name.clone()).collect();
        tasks.push(tokio::spawn(async move {
            let mut results = Vec::with_capacity(names.len());
            for name in names {
                let request = Frame::empty(MessageType::InternalGetMetadata, 0, 0, &name);
                let reply = handle.dispatch(request).await.ok();
                let parsed = reply.and_then(|r| MetadataRespPayload::from_bytes(&r.payload).ok());
                results.push(parsed);
            }
            (indices, results)
        }));
    }

    for task in tasks {
        let Ok((indices, results)) = task.await else { continue };
        for (index, metadata) in indices.into_iter().zip(results) {
            let Some(metadata) = metadata else { continue };
            let record = &mut files[index];
            record.stats.word_count = metadata.word_count as usize;
            record.stats.char_count = metadata.char_count as usize;
            record.stats.created = metadata.created;
            record.stats.modified = metadata.last_modified;
            record.stats.last_accessed = metadata.last_accessed;
            record.stats.last_accessed_by =
                if metadata.last_accessed_by.is_empty() { None } else { Some(metadata.last_accessed_by) };
        }
    }
}
