//! `EXEC <file>` (spec §4.4): read permission check, fetch the file's bytes
//! from its owning Node over the control link, then run them as a command.
//!
//! Gated behind `--enable-exec` (spec §9 open question on unsanitised
//! command execution) and, when enabled, never goes through a shell —
//! argv[0] plus arguments are tokenised from the first line and executed
//! directly with `std::process::Command`.

use std::process::Command;
use std::sync::Arc;

use tracing::warn;

use crate::directory::server::Directory;
use crate::domain::acl::Permission;
use crate::error::{Error, Result};
use crate::wire::message::MessageType;
use crate::wire::Frame;

pub async fn exec_file(
    directory: &Arc<Directory>,
    identity: &str,
    enable_exec: bool,
    filename: &str,
) -> Result<Vec<u8>> {
    if !enable_exec {
        return Err(Error::unauthorized("EXEC is disabled on this Directory"));
    }
    if !directory.trie.permits(filename, identity, Permission::Read).await? {
        return Err(Error::unauthorized(format!("{identity} may not read {filename}")));
    }
    let node_index = directory.trie.locate(filename).await.ok_or_else(|| Error::not_found(filename))?;

    let request = Frame::empty(MessageType::InternalRead, 0, 0, filename);
    let reply = directory.dispatch_node(node_index, request).await?;
    if reply.msg_type() != MessageType::InternalData {
        return Err(Error::internal("node did not return file data"));
    }

    let content = String::from_utf8_lossy(&reply.payload).into_owned();
    let mut tokens = content.lines().next().unwrap_or("").split_whitespace();
    let program = tokens.next().ok_or_else(|| Error::bad_request("file is empty, nothing to execute"))?;
    let args: Vec<&str> = tokens.collect();

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| Error::internal(format!("failed to execute {program}: {e}")))?;
    if !output.status.success() {
        warn!(program, status = ?output.status, "EXEC command exited non-zero");
    }

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(combined)
}
