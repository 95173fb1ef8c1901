//! The interactive Client prompt: reads commands from stdin, dispatches
//! to the Directory or (after a redirect) straight to a Node.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::client::node_link::NodeLink;
use crate::client::DirectoryClient;
use crate::domain::acl::Permission;
use crate::error::Result;
use crate::wire::message::MessageType;

/// Runs the prompt loop until `exit`/`quit` or EOF on stdin.
pub async fn run(mut directory: DirectoryClient) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"parchment> ").await?;
        stdout.flush().await?;

        let mut line = String::new();
        if stdin.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        if matches!(verb, "exit" | "quit") {
            return Ok(());
        }

        if let Err(e) = dispatch(&mut directory, &mut stdin, &mut stdout, verb, &args).await {
            println!("error: {e}");
        }
    }
}

async fn dispatch(
    directory: &mut DirectoryClient,
    stdin: &mut BufReader<tokio::io::Stdin>,
    stdout: &mut tokio::io::Stdout,
    verb: &str,
    args: &[&str],
) -> Result<()> {
    match verb {
        "create" => {
            directory.create(require(args, 0, "create <file>")?).await?;
            println!("created");
        }
        "delete" => {
            directory.delete(require(args, 0, "delete <file>")?).await?;
            println!("deleted");
        }
        "undo" => {
            directory.undo(require(args, 0, "undo <file>")?).await?;
            println!("undone");
        }
        "locate" => {
            let (ip, port) = directory.locate(require(args, 0, "locate <file>")?).await?;
            println!("{ip}:{port}");
        }
        "read" => {
            let name = require(args, 0, "read <file>")?;
            let (ip, port) = directory.redirect(MessageType::Read, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("READ {name}")).await?;
            let status = link.recv_line().await?;
            if status.contains("FILE_CONTENT") {
                for line in link.recv_until("END_OF_FILE").await? {
                    println!("{line}");
                }
            } else {
                println!("{status}");
            }
            link.exit().await;
        }
        "write" => {
            let name = require(args, 0, "write <file> <n>")?;
            let n = require(args, 1, "write <file> <n>")?;
            let (ip, port) = directory.redirect(MessageType::Write, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("WRITE {name} {n}")).await?;
            println!("{}", link.recv_line().await?);
            println!("enter `<word_index> <content>` lines; `commit` to finish, `cancel` to abort");
            loop {
                stdout.write_all(b"write> ").await?;
                stdout.flush().await?;
                let mut edit = String::new();
                if stdin.read_line(&mut edit).await? == 0 {
                    break;
                }
                let edit = edit.trim();
                if edit == "commit" {
                    link.send("ETIRW").await?;
                    println!("{}", link.recv_line().await?);
                    break;
                }
                if edit == "cancel" {
                    break;
                }
                if edit.is_empty() {
                    continue;
                }
                link.send(edit).await?;
                println!("{}", link.recv_line().await?);
            }
            link.exit().await;
        }
        "stream" => {
            let name = require(args, 0, "stream <file>")?;
            let (ip, port) = directory.redirect(MessageType::Stream, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("STREAM {name}")).await?;
            loop {
                let line = link.recv_line().await?;
                let done = matches!(line.as_str(), "STREAM_COMPLETE" | "STREAM_STOPPED" | "OK_200 EMPTY_FILE_STREAM");
                println!("{line}");
                if done {
                    break;
                }
            }
            link.exit().await;
        }
        "checkpoint" => {
            let name = require(args, 0, "checkpoint <file> <tag>")?;
            let tag = require(args, 1, "checkpoint <file> <tag>")?;
            let (ip, port) = directory.redirect(MessageType::Checkpoint, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("CHECKPOINT {name} {tag}")).await?;
            println!("{}", link.recv_line().await?);
            link.exit().await;
        }
        "listcheckpoints" => {
            let name = args.first().copied().unwrap_or("");
            let (ip, port) = directory.redirect(MessageType::ListCheckpoints, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("LISTCHECKPOINTS {name}")).await?;
            link.recv_line().await?;
            for line in link.recv_until("END_OF_LIST").await? {
                println!("{line}");
            }
            link.exit().await;
        }
        "viewcheckpoint" => {
            let name = require(args, 0, "viewcheckpoint <file> <tag>")?;
            let tag = require(args, 1, "viewcheckpoint <file> <tag>")?;
            let (ip, port) = directory.redirect(MessageType::ViewCheckpoint, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("VIEWCHECKPOINT {name} {tag}")).await?;
            link.recv_line().await?;
            for line in link.recv_until("END_OF_CHECKPOINT").await? {
                println!("{line}");
            }
            link.exit().await;
        }
        "revert" => {
            let name = require(args, 0, "revert <file> <tag>")?;
            let tag = require(args, 1, "revert <file> <tag>")?;
            let (ip, port) = directory.redirect(MessageType::Revert, name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("REVERT {name} {tag}")).await?;
            println!("{}", link.recv_line().await?);
            link.exit().await;
        }
        "requestaccess" => {
            // LOCATE_FILE bypasses the permission check (spec §4.6), which is
            // the point: the requester does not hold access yet.
            let name = require(args, 0, "requestaccess <file> <-R|-W>")?;
            let flag = require(args, 1, "requestaccess <file> <-R|-W>")?;
            let (ip, port) = directory.locate(name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("REQUESTACCESS {name} {flag}")).await?;
            println!("{}", link.recv_line().await?);
            link.exit().await;
        }
        "viewrequests" => {
            // Scoped to one file's owning Node; this implementation does not
            // aggregate across Nodes for the bare `viewrequests` form.
            let name = require(args, 0, "viewrequests <file>")?;
            let (ip, port) = directory.locate(name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            link.send(&format!("VIEWREQUESTS {name}")).await?;
            link.recv_line().await?;
            for line in link.recv_until("END_OF_REQUESTS").await? {
                println!("{line}");
            }
            link.exit().await;
        }
        "approverequest" | "denyrequest" => {
            let name = require(args, 0, "approverequest <file> <user> <-R|-W>")?;
            let user = require(args, 1, "approverequest <file> <user> <-R|-W>")?;
            let flag = require(args, 2, "approverequest <file> <user> <-R|-W>")?;
            let (ip, port) = directory.locate(name).await?;
            let mut link = NodeLink::connect(&ip, port, &directory.identity).await?;
            let command = if verb == "approverequest" { "APPROVEREQUEST" } else { "DENYREQUEST" };
            link.send(&format!("{command} {name} {user} {flag}")).await?;
            println!("{}", link.recv_line().await?);
            link.exit().await;
        }
        "addaccess" => {
            let name = require(args, 0, "addaccess <file> <user> <-R|-W>")?;
            let user = require(args, 1, "addaccess <file> <user> <-R|-W>")?;
            let flag = require(args, 2, "addaccess <file> <user> <-R|-W>")?;
            let permission = Permission::from_flag(flag)
                .ok_or_else(|| crate::error::Error::bad_request("permission must be -R or -W"))?;
            directory.add_access(name, user, permission).await?;
            println!("access granted");
        }
        "remaccess" => {
            let name = require(args, 0, "remaccess <file> <user>")?;
            let user = require(args, 1, "remaccess <file> <user>")?;
            directory.rem_access(name, user).await?;
            println!("access revoked");
        }
        "exec" => {
            let name = require(args, 0, "exec <file>")?;
            let output = directory.exec(name).await?;
            print!("{}", String::from_utf8_lossy(&output));
        }
        "rename" => {
            let old_name = require(args, 0, "rename <old> <new>")?;
            let new_name = require(args, 1, "rename <old> <new>")?;
            directory.rename(old_name, new_name).await?;
            println!("renamed");
        }
        "movefolder" => {
            let old_prefix = require(args, 0, "movefolder <old_prefix> <new_prefix>")?;
            let new_prefix = require(args, 1, "movefolder <old_prefix> <new_prefix>")?;
            directory.move_folder(old_prefix, new_prefix).await?;
            println!("moved");
        }
        "view" => {
            let long = args.contains(&"-l");
            let folder = args.iter().find(|a| !a.starts_with('-')).copied();
            println!("{}", directory.view(folder, long).await?);
        }
        "deadreport" => {
            let ip = require(args, 0, "deadreport <ip> <port>")?;
            let port: i32 = require(args, 1, "deadreport <ip> <port>")?
                .parse()
                .map_err(|_| crate::error::Error::bad_request("port must be a number"))?;
            directory.report_dead(ip, port).await?;
            println!("reported");
        }
        other => println!("unrecognised command: {other}"),
    }
    Ok(())
}

fn require<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index).copied().ok_or_else(|| crate::error::Error::bad_request(format!("usage: {usage}")))
}
