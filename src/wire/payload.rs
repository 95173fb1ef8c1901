//! Payload (de)serialisation for the framed messages listed in spec §6.
//!
//! Small composable encode/decode functions over a byte cursor, for a
//! flat layout: fixed-width fields, little-endian integers, no alignment
//! padding.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::domain::acl::{Acl, AclEntry, Permission};
use crate::domain::file_record::FileRecord;

/// Maximum length of an identity/IP string field on the wire.
pub const IDENTITY_LEN: usize = 64;
/// Maximum length of a filename/folder field on the wire.
pub const NAME_LEN: usize = 256;
/// Maximum ACL entries carried on the wire, matching the in-memory cap.
pub const MAX_ACL_ENTRIES: usize = 10;

fn write_fixed(buf: &mut Vec<u8>, s: &str, width: usize) {
    let mut field = vec![0u8; width];
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    field[..n].copy_from_slice(&bytes[..n]);
    buf.extend_from_slice(&field);
}

fn read_fixed(cursor: &mut impl Read, width: usize) -> io::Result<String> {
    let mut field = vec![0u8; width];
    cursor.read_exact(&mut field)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&field[..end]).into_owned())
}

/// `(ip[64], port:i32)` — payload of `REGISTER`, `READ_REDIRECT`,
/// `LOCATE_RESPONSE`, and `SS_DEAD_REPORT`.
#[derive(Debug, Clone)]
pub struct AddressPayload {
    pub ip: String,
    pub port: i32,
}

impl AddressPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IDENTITY_LEN + 4);
        write_fixed(&mut buf, &self.ip, IDENTITY_LEN);
        buf.write_i32::<LittleEndian>(self.port).expect("vec write");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cur = Cursor::new(bytes);
        let ip = read_fixed(&mut cur, IDENTITY_LEN)?;
        let port = cur.read_i32::<LittleEndian>()?;
        Ok(Self { ip, port })
    }
}

/// `(target_identity[64], permission:u32)` — payload of `ADD_ACCESS`.
#[derive(Debug, Clone)]
pub struct AddAccessPayload {
    pub identity: String,
    pub permission: Permission,
}

impl AddAccessPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IDENTITY_LEN + 4);
        write_fixed(&mut buf, &self.identity, IDENTITY_LEN);
        buf.write_u32::<LittleEndian>(self.permission.to_wire()).expect("vec write");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cur = Cursor::new(bytes);
        let identity = read_fixed(&mut cur, IDENTITY_LEN)?;
        let permission = Permission::from_wire(cur.read_u32::<LittleEndian>()?)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad permission"))?;
        Ok(Self { identity, permission })
    }
}

/// `(word_count, char_count, created, last_modified, last_accessed,
/// last_accessed_by[64])` — payload of `INTERNAL_METADATA_RESP`.
#[derive(Debug, Clone)]
pub struct MetadataRespPayload {
    pub word_count: i64,
    pub char_count: i64,
    pub created: i64,
    pub last_modified: i64,
    pub last_accessed: i64,
    pub last_accessed_by: String,
}

impl MetadataRespPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 * 5 + IDENTITY_LEN);
        buf.write_i64::<LittleEndian>(self.word_count).expect("vec write");
        buf.write_i64::<LittleEndian>(self.char_count).expect("vec write");
        buf.write_i64::<LittleEndian>(self.created).expect("vec write");
        buf.write_i64::<LittleEndian>(self.last_modified).expect("vec write");
        buf.write_i64::<LittleEndian>(self.last_accessed).expect("vec write");
        write_fixed(&mut buf, &self.last_accessed_by, IDENTITY_LEN);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cur = Cursor::new(bytes);
        Ok(Self {
            word_count: cur.read_i64::<LittleEndian>()?,
            char_count: cur.read_i64::<LittleEndian>()?,
            created: cur.read_i64::<LittleEndian>()?,
            last_modified: cur.read_i64::<LittleEndian>()?,
            last_accessed: cur.read_i64::<LittleEndian>()?,
            last_accessed_by: read_fixed(&mut cur, IDENTITY_LEN)?,
        })
    }
}

/// The full file record as sent over the wire (spec §6): filename, owner,
/// up to 10 ACL entries, word/char counts, three timestamps, last-accessed
/// identity, and folder path.
#[derive(Debug, Clone)]
pub struct FileRecordWire {
    pub filename: String,
    pub owner: String,
    pub acl: Vec<AclEntry>,
    pub word_count: i64,
    pub char_count: i64,
    pub created: i64,
    pub modified: i64,
    pub last_accessed: i64,
    pub last_accessed_by: String,
    pub folder: Option<String>,
}

impl FileRecordWire {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            filename: record.name.clone(),
            owner: record.owner.clone(),
            acl: record.acl.entries().to_vec(),
            word_count: record.stats.word_count as i64,
            char_count: record.stats.char_count as i64,
            created: record.stats.created,
            modified: record.stats.modified,
            last_accessed: record.stats.last_accessed,
            last_accessed_by: record.stats.last_accessed_by.clone().unwrap_or_default(),
            folder: record.folder.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NAME_LEN * 2 + IDENTITY_LEN * 12 + 64);
        write_fixed(&mut buf, &self.filename, NAME_LEN);
        write_fixed(&mut buf, &self.owner, IDENTITY_LEN);
        for slot in 0..MAX_ACL_ENTRIES {
            if let Some(entry) = self.acl.get(slot) {
                write_fixed(&mut buf, &entry.identity, IDENTITY_LEN);
                buf.write_u32::<LittleEndian>(entry.permission.to_wire()).expect("vec write");
            } else {
                write_fixed(&mut buf, "", IDENTITY_LEN);
                buf.write_u32::<LittleEndian>(0).expect("vec write");
            }
        }
        buf.write_i32::<LittleEndian>(self.acl.len() as i32).expect("vec write");
        buf.write_i64::<LittleEndian>(self.word_count).expect("vec write");
        buf.write_i64::<LittleEndian>(self.char_count).expect("vec write");
        buf.write_i64::<LittleEndian>(self.created).expect("vec write");
        buf.write_i64::<LittleEndian>(self.modified).expect("vec write");
        buf.write_i64::<LittleEndian>(self.last_accessed).expect("vec write");
        write_fixed(&mut buf, &self.last_accessed_by, IDENTITY_LEN);
        write_fixed(&mut buf, self.folder.as_deref().unwrap_or(""), NAME_LEN);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cur = Cursor::new(bytes);
        let filename = read_fixed(&mut cur, NAME_LEN)?;
        let owner = read_fixed(&mut cur, IDENTITY_LEN)?;
        let mut raw_entries = Vec::with_capacity(MAX_ACL_ENTRIES);
        for _ in 0..MAX_ACL_ENTRIES {
            let identity = read_fixed(&mut cur, IDENTITY_LEN)?;
            let perm = cur.read_u32::<LittleEndian>()?;
            raw_entries.push((identity, perm));
        }
        let acl_count = cur.read_i32::<LittleEndian>()? as usize;
        let word_count = cur.read_i64::<LittleEndian>()?;
        let char_count = cur.read_i64::<LittleEndian>()?;
        let created = cur.read_i64::<LittleEndian>()?;
        let modified = cur.read_i64::<LittleEndian>()?;
        let last_accessed = cur.read_i64::<LittleEndian>()?;
        let last_accessed_by = read_fixed(&mut cur, IDENTITY_LEN)?;
        let folder = read_fixed(&mut cur, NAME_LEN)?;

        let acl = raw_entries
            .into_iter()
            .take(acl_count)
            .filter_map(|(identity, perm)| {
                Permission::from_wire(perm).map(|permission| AclEntry { identity, permission })
            })
            .collect();

        Ok(Self {
            filename,
            owner,
            acl,
            word_count,
            char_count,
            created,
            modified,
            last_accessed,
            last_accessed_by,
            folder: if folder.is_empty() { None } else { Some(folder) },
        })
    }

    pub fn acl(&self) -> Acl {
        Acl::from_entries(self.acl.clone())
    }
}
