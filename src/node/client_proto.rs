//! The Node's direct Client text dialogue (spec §4.1, §4.5): one worker per
//! connection, `USER <identity>` handshake, then verb-prefixed commands
//! until `EXIT` or disconnect.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;

use crate::domain::acl::Permission;
use crate::domain::sentence::{insert_words, max_write_index, render_sentences, split_sentences};
use crate::error::{Error, Result};
use crate::node::server::Node;
use crate::node::{checkpoint, merge, persistence, stream, swap, undo};

pub(crate) async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

struct OpenWrite {
    filename: String,
    sentence: usize,
}

struct Session {
    node: Arc<Node>,
    client_id: u64,
    identity: String,
    open_write: Option<OpenWrite>,
}

/// Runs one Client connection to completion. `client_id` is assigned and
/// tracked in `node.open_clients` by the caller so a forced shutdown can
/// abort this task from outside.
pub async fn handle(node: Arc<Node>, stream: TcpStream, client_id: u64) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let identity = match authenticate(&mut reader, &mut writer).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = write_line(&mut writer, &e.text_line()).await;
            return;
        }
    };
    info!(%identity, client_id, "client connected to node");

    let mut session = Session { node: node.clone(), client_id, identity, open_write: None };
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if line == "EXIT" {
            let _ = write_line(&mut writer, "OK_200 GOODBYE").await;
            break;
        }
        match session.dispatch(line, &mut reader, &mut writer).await {
            Ok(()) => {}
            Err(e) => {
                let _ = write_line(&mut writer, &e.text_line()).await;
            }
        }
    }

    node.locks.release_all(client_id).await;
    info!(client_id, "client disconnected from node");
}

async fn authenticate<R, W>(reader: &mut R, writer: &mut W) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let line = line.trim();
    let identity = line.strip_prefix("USER ").map(str::trim).filter(|s| !s.is_empty());
    match identity {
        Some(identity) => {
            write_line(writer, "OK_200 USER_ACCEPTED").await?;
            Ok(identity.to_string())
        }
        None => Err(Error::bad_request("expected USER <identity>")),
    }
}

impl Session {
    async fn dispatch<R, W>(&mut self, line: &str, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "READ" => self.read(rest.trim(), writer).await,
            "WRITE" => self.open_write(rest.trim(), writer).await,
            "ETIRW" => self.commit(writer).await,
            "STREAM" => self.stream(rest.trim(), reader, writer).await,
            "CHECKPOINT" => self.checkpoint(rest.trim(), writer).await,
            "LISTCHECKPOINTS" => self.list_checkpoints(rest.trim(), writer).await,
            "VIEWCHECKPOINT" => self.view_checkpoint(rest.trim(), writer).await,
            "REVERT" => self.revert(rest.trim(), writer).await,
            "REQUESTACCESS" => self.request_access(rest.trim(), writer).await,
            "VIEWREQUESTS" => self.view_requests(rest.trim(), writer).await,
            "APPROVEREQUEST" => self.resolve_request(rest.trim(), true, writer).await,
            "DENYREQUEST" => self.resolve_request(rest.trim(), false, writer).await,
            "UNDO" => self.undo(rest.trim(), writer).await,
            "CREATE" => self.create(rest.trim(), writer).await,
            "DELETE" => self.delete(rest.trim(), writer).await,
            _ => {
                if self.open_write.is_some() {
                    self.write_word(line, writer).await
                } else {
                    Err(Error::bad_request(format!("unrecognised command {verb}")))
                }
            }
        }
    }

    async fn read<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        let mut files = self.node.files.write().await;
        let record = files.get_mut(filename).ok_or_else(|| Error::not_found(filename))?;
        if !record.permits(&self.identity, Permission::Read) {
            return Err(Error::unauthorized(format!("{} may not read {filename}", self.identity)));
        }
        record.stats.last_accessed = crate::now_unix();
        record.stats.last_accessed_by = Some(self.identity.clone());
        let content = record.content.clone();
        drop(files);
        self.node.persist().await?;

        if content.is_empty() {
            write_line(writer, "OK_200 EMPTY_FILE").await
        } else {
            write_line(writer, "OK_200 FILE_CONTENT").await?;
            write_line(writer, &content).await?;
            write_line(writer, "END_OF_FILE").await
        }
    }

    async fn open_write<W: AsyncWrite + Unpin>(&mut self, args: &str, writer: &mut W) -> Result<()> {
        let (filename, n) = args.split_once(' ').ok_or_else(|| Error::bad_request("usage: WRITE <file> <n>"))?;
        let n: usize = n.trim().parse().map_err(|_| Error::bad_request("sentence index must be a number"))?;

        let files = self.node.files.read().await;
        let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
        if !record.permits(&self.identity, Permission::Write) {
            return Err(Error::unauthorized(format!("{} may not write {filename}", self.identity)));
        }
        let sentences = split_sentences(&record.content);
        let max = max_write_index(&sentences);
        drop(files);
        if n < 1 || n > max {
            return Err(Error::not_found(format!("sentence {n} (valid range is 1..={max})")));
        }

        self.node.locks.acquire(filename, n, self.client_id).await?;
        self.open_write = Some(OpenWrite { filename: filename.to_string(), sentence: n });
        write_line(writer, "OK_200 WRITE MODE ENABLED").await
    }

    async fn write_word<W: AsyncWrite + Unpin>(&mut self, line: &str, writer: &mut W) -> Result<()> {
        let open = self.open_write.as_ref().ok_or_else(|| Error::bad_request("no open WRITE session"))?;
        let (word_index, content) =
            line.split_once(' ').ok_or_else(|| Error::bad_request("usage: <word_index> <content>"))?;
        let word_index: usize =
            word_index.trim().parse().map_err(|_| Error::bad_request("word index must be a number"))?;

        let path = swap::swap_path(&self.node.layout.files_dir(), &open.filename, open.sentence, self.client_id);
        let base = match swap::read(&path).await? {
            Some(existing) => existing,
            None => {
                let files = self.node.files.read().await;
                let record = files.get(&open.filename).ok_or_else(|| Error::not_found(&open.filename))?;
                record.content.clone()
            }
        };

        let mut sentences = split_sentences(&base);
        while sentences.len() < open.sentence {
            sentences.push(Default::default());
        }
        let target = sentences[open.sentence - 1].clone();
        let new_words: Vec<String> = content.split_whitespace().map(str::to_string).collect();
        let updated = insert_words(&target, word_index, &new_words)
            .ok_or_else(|| Error::not_found(format!("word index {word_index}")))?;
        sentences[open.sentence - 1] = updated;
        let rendered = render_sentences(&sentences);

        swap::write(&path, &rendered).await?;
        write_line(writer, "OK_200 WORD_INSERTED").await
    }

    async fn commit<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<()> {
        let open = self.open_write.take().ok_or_else(|| Error::bad_request("no open WRITE session"))?;
        let path = swap::swap_path(&self.node.layout.files_dir(), &open.filename, open.sentence, self.client_id);

        let swap_content = swap::read(&path).await?;
        let Some(swap_content) = swap_content else {
            self.node.locks.release(&open.filename, open.sentence, self.client_id).await;
            return write_line(writer, "OK_200 WRITE COMPLETED").await;
        };

        let mut files = self.node.files.write().await;
        let record = files.get_mut(&open.filename).ok_or_else(|| Error::not_found(&open.filename))?;

        let now = crate::now_unix();
        let backup_path = persistence::backup_path(&self.node.layout, &open.filename, now);
        let backup_name = backup_path.file_name().expect("backup_path always has a file name").to_string_lossy().into_owned();
        tokio::fs::create_dir_all(&self.node.layout.versions_dir()).await?;
        tokio::fs::write(&backup_path, &record.content).await?;
        let journal = undo::Journal::new(undo::journal_path(&self.node.layout.root, &open.filename));
        journal.append(now, &backup_name, &self.identity).await?;

        record.content = merge::commit(&record.content, &swap_content, open.sentence);
        record.refresh_counts();
        record.stats.modified = now;
        drop(files);

        swap::remove(&path).await?;
        self.node.locks.release(&open.filename, open.sentence, self.client_id).await;
        self.node.persist().await?;
        write_line(writer, "OK_200 WRITE COMPLETED").await
    }

    async fn stream<R, W>(&self, filename: &str, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let files = self.node.files.read().await;
        let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
        if !record.permits(&self.identity, Permission::Read) {
            return Err(Error::unauthorized(format!("{} may not read {filename}", self.identity)));
        }
        let content = record.content.clone();
        drop(files);
        stream::run(reader, writer, &content).await
    }

    async fn checkpoint<W: AsyncWrite + Unpin>(&self, args: &str, writer: &mut W) -> Result<()> {
        let (filename, tag) =
            args.split_once(' ').ok_or_else(|| Error::bad_request("usage: CHECKPOINT <file> <tag>"))?;
        if self.node.locks.is_locked(filename).await {
            return Err(Error::conflict(format!("{filename} has locked sentences")));
        }
        let files = self.node.files.read().await;
        let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
        if !record.permits(&self.identity, Permission::Write) {
            return Err(Error::unauthorized(format!("{} may not checkpoint {filename}", self.identity)));
        }
        let content = record.content.clone();
        drop(files);

        let set = checkpoint::CheckpointSet::new(&self.node.layout.root, filename);
        set.create(tag.trim(), &self.identity, &content, crate::now_unix()).await?;
        write_line(writer, "OK_200 CHECKPOINT_CREATED").await
    }

    async fn list_checkpoints<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        let set = checkpoint::CheckpointSet::new(&self.node.layout.root, filename);
        let entries = set.list().await?;
        write_line(writer, "OK_200 CHECKPOINT_LIST").await?;
        for entry in entries {
            write_line(writer, &format!("{} {} {}", entry.tag, entry.timestamp, entry.creator)).await?;
        }
        write_line(writer, "END_OF_LIST").await
    }

    async fn view_checkpoint<W: AsyncWrite + Unpin>(&self, args: &str, writer: &mut W) -> Result<()> {
        let (filename, tag) =
            args.split_once(' ').ok_or_else(|| Error::bad_request("usage: VIEWCHECKPOINT <file> <tag>"))?;
        let set = checkpoint::CheckpointSet::new(&self.node.layout.root, filename);
        let content = set.read(tag.trim()).await?;
        write_line(writer, "OK_200 CHECKPOINT_CONTENT").await?;
        write_line(writer, &content).await?;
        write_line(writer, "END_OF_CHECKPOINT").await
    }

    async fn revert<W: AsyncWrite + Unpin>(&self, args: &str, writer: &mut W) -> Result<()> {
        let (filename, tag) = args.split_once(' ').ok_or_else(|| Error::bad_request("usage: REVERT <file> <tag>"))?;
        if self.node.locks.is_locked(filename).await {
            return Err(Error::conflict(format!("{filename} has locked sentences")));
        }
        let set = checkpoint::CheckpointSet::new(&self.node.layout.root, filename);
        let snapshot = set.read(tag.trim()).await?;

        let mut files = self.node.files.write().await;
        let record = files.get_mut(filename).ok_or_else(|| Error::not_found(filename))?;
        if !record.permits(&self.identity, Permission::Write) {
            return Err(Error::unauthorized(format!("{} may not revert {filename}", self.identity)));
        }

        let now = crate::now_unix();
        let backup_path = persistence::backup_path(&self.node.layout, filename, now);
        let backup_name = backup_path.file_name().expect("backup_path always has a file name").to_string_lossy().into_owned();
        tokio::fs::create_dir_all(&self.node.layout.versions_dir()).await?;
        tokio::fs::write(&backup_path, &record.content).await?;
        let journal = undo::Journal::new(undo::journal_path(&self.node.layout.root, filename));
        journal.append(now, &backup_name, &self.identity).await?;

        record.content = snapshot;
        record.refresh_counts();
        record.stats.modified = now;
        drop(files);
        self.node.persist().await?;
        write_line(writer, "OK_200 REVERTED").await
    }

    async fn request_access<W: AsyncWrite + Unpin>(&self, args: &str, writer: &mut W) -> Result<()> {
        let (filename, flag) =
            args.split_once(' ').ok_or_else(|| Error::bad_request("usage: REQUESTACCESS <file> <-R|-W>"))?;
        let permission = Permission::from_flag(flag.trim()).ok_or_else(|| Error::bad_request("flag must be -R or -W"))?;

        let files = self.node.files.read().await;
        let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
        if record.owner == self.identity {
            return Err(Error::bad_request("the owner does not need to request access"));
        }
        if record.permits(&self.identity, permission) {
            return Err(Error::conflict("you already hold this permission"));
        }
        drop(files);

        let log = crate::node::access_requests::RequestLog::new(&self.node.layout.root, filename);
        log.request(&self.identity, permission, crate::now_unix()).await?;
        write_line(writer, "OK_200 REQUEST_SUBMITTED").await
    }

    async fn view_requests<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        write_line(writer, "OK_200 REQUEST_LIST").await?;
        let candidates: Vec<String> = if filename.is_empty() {
            let files = self.node.files.read().await;
            files.values().filter(|r| r.owner == self.identity).map(|r| r.name.clone()).collect()
        } else {
            let files = self.node.files.read().await;
            let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
            if record.owner != self.identity {
                return Err(Error::unauthorized(format!("{} does not own {filename}", self.identity)));
            }
            vec![filename.to_string()]
        };
        for name in candidates {
            let log = crate::node::access_requests::RequestLog::new(&self.node.layout.root, &name);
            for entry in log.pending().await? {
                write_line(writer, &format!("{name} {} {:?} {}", entry.requester, entry.permission, entry.timestamp))
                    .await?;
            }
        }
        write_line(writer, "END_OF_REQUESTS").await
    }

    async fn resolve_request<W: AsyncWrite + Unpin>(&self, args: &str, approve: bool, writer: &mut W) -> Result<()> {
        let mut parts = args.split_whitespace();
        let filename = parts.next().ok_or_else(|| Error::bad_request("usage: APPROVEREQUEST <file> <user> <-R|-W>"))?;
        let requester = parts.next().ok_or_else(|| Error::bad_request("missing requester"))?;
        let flag = parts.next().ok_or_else(|| Error::bad_request("missing permission flag"))?;
        let permission = Permission::from_flag(flag).ok_or_else(|| Error::bad_request("flag must be -R or -W"))?;

        let mut files = self.node.files.write().await;
        let record = files.get_mut(filename).ok_or_else(|| Error::not_found(filename))?;
        if record.owner != self.identity {
            return Err(Error::unauthorized(format!("{} does not own {filename}", self.identity)));
        }

        let log = crate::node::access_requests::RequestLog::new(&self.node.layout.root, filename);
        if approve {
            log.approve(requester, permission).await?;
            record.acl.grant(requester, permission).map_err(Error::conflict)?;
        } else {
            log.deny(requester, permission).await?;
        }
        drop(files);
        self.node.persist().await?;
        write_line(writer, if approve { "OK_200 REQUEST_APPROVED" } else { "OK_200 REQUEST_DENIED" }).await
    }

    async fn undo<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        if self.node.locks.is_locked(filename).await {
            return Err(Error::conflict(format!("{filename} has locked sentences")));
        }
        let journal = undo::Journal::new(undo::journal_path(&self.node.layout.root, filename));
        let backup_name = journal.consume_latest().await?;
        let restored = tokio::fs::read_to_string(self.node.layout.versions_dir().join(&backup_name)).await?;

        let mut files = self.node.files.write().await;
        let record = files.get_mut(filename).ok_or_else(|| Error::not_found(filename))?;
        record.content = restored;
        record.refresh_counts();
        record.stats.modified = crate::now_unix();
        drop(files);
        self.node.persist().await?;
        write_line(writer, "OK_200 UNDO_APPLIED").await
    }

    async fn create<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        let mut files = self.node.files.write().await;
        if files.contains_key(filename) {
            return Err(Error::conflict(format!("{filename} already exists")));
        }
        let record = crate::domain::file_record::NodeFileRecord::new(filename, self.identity.clone(), crate::now_unix());
        files.insert(filename.to_string(), record);
        drop(files);
        self.node.persist().await?;
        write_line(writer, "OK_200 CREATED").await
    }

    async fn delete<W: AsyncWrite + Unpin>(&self, filename: &str, writer: &mut W) -> Result<()> {
        let mut files = self.node.files.write().await;
        let record = files.get(filename).ok_or_else(|| Error::not_found(filename))?;
        if record.owner != self.identity {
            return Err(Error::unauthorized(format!("{} does not own {filename}", self.identity)));
        }
        files.remove(filename);
        drop(files);
        let _ = tokio::fs::remove_file(self.node.layout.file_path(filename)).await;
        self.node.persist().await?;
        write_line(writer, "OK_200 DELETED").await
    }
}

