//! Per-file access-request log (spec §3 "Access request", §4.5 "Access
//! requests"). An append-only log of `(timestamp, requester, permission,
//! status)`; at most one `pending` entry per `(file, requester, permission)`.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::domain::acl::Permission;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Approved,
    Denied,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Denied => "denied",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "approved" => Some(Status::Approved),
            "denied" => Some(Status::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub timestamp: i64,
    pub requester: String,
    pub permission: Permission,
    pub status: Status,
}

impl AccessRequest {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '|');
        let timestamp = fields.next()?.parse().ok()?;
        let requester = fields.next()?.to_string();
        let permission = match fields.next()? {
            "R" => Permission::Read,
            "W" => Permission::Write,
            _ => return None,
        };
        let status = Status::parse(fields.next()?)?;
        Some(Self { timestamp, requester, permission, status })
    }

    fn render(&self) -> String {
        let perm = match self.permission {
            Permission::Write => "W",
            _ => "R",
        };
        format!("{}|{}|{}|{}", self.timestamp, self.requester, perm, self.status.as_str())
    }
}

pub struct RequestLog {
    path: PathBuf,
}

impl RequestLog {
    pub fn new(root: &Path, filename: &str) -> Self {
        Self { path: root.join("access_requests").join(format!("{filename}.requests")) }
    }

    async fn load(&self) -> Result<Vec<AccessRequest>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().filter_map(AccessRequest::parse).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &[AccessRequest]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body: String = entries.iter().map(|e| e.render() + "\n").collect();
        fs::write(&self.path, body).await?;
        Ok(())
    }

    pub async fn request(&self, requester: &str, permission: Permission, timestamp: i64) -> Result<()> {
        let mut entries = self.load().await?;
        if entries.iter().any(|e| e.requester == requester && e.permission == permission && e.status == Status::Pending) {
            return Err(Error::conflict("a pending request for this permission already exists"));
        }
        entries.push(AccessRequest { timestamp, requester: requester.to_string(), permission, status: Status::Pending });
        self.save(&entries).await
    }

    pub async fn pending(&self) -> Result<Vec<AccessRequest>> {
        Ok(self.load().await?.into_iter().filter(|e| e.status == Status::Pending).collect())
    }

    async fn resolve(&self, requester: &str, permission: Permission, status: Status) -> Result<()> {
        let mut entries = self.load().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.requester == requester && e.permission == permission && e.status == Status::Pending)
            .ok_or_else(|| Error::not_found("pending access request"))?;
        entry.status = status;
        self.save(&entries).await
    }

    pub async fn approve(&self, requester: &str, permission: Permission) -> Result<()> {
        self.resolve(requester, permission, Status::Approved).await
    }

    pub async fn deny(&self, requester: &str, permission: Permission) -> Result<()> {
        self.resolve(requester, permission, Status::Denied).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn duplicate_pending_request_conflicts() {
        let dir = tempdir().unwrap();
        let log = RequestLog::new(dir.path(), "a.txt");
        log.request("bob", Permission::Read, 1).await.unwrap();
        assert!(log.request("bob", Permission::Read, 2).await.is_err());
    }

    #[tokio::test]
    async fn approve_resolves_the_pending_entry() {
        let dir = tempdir().unwrap();
        let log = RequestLog::new(dir.path(), "a.txt");
        log.request("bob", Permission::Write, 1).await.unwrap();
        log.approve("bob", Permission::Write).await.unwrap();
        assert!(log.pending().await.unwrap().is_empty());
    }
}
