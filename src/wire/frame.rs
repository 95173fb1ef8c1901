//! Fixed binary frame header and the async read/write helpers built on it.
//!
//! Each frame is `header || payload`. The header is five fields: `msg_type`
//! (u16), `source` (u16), `dest` (u16), `payload_length` (u32), and a
//! fixed-width 256-byte name field. Spec §9 notes the reference
//! implementation's host-endian header is underspecified for interop; this
//! implementation fixes little-endian, as the design notes permit.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use num_traits::{FromPrimitive, ToPrimitive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::MessageType;

/// Width of the fixed name field carried by every frame.
pub const NAME_FIELD_LEN: usize = 256;

/// Wire size of [`FrameHeader`]: 2 + 2 + 2 + 4 + 256.
pub const HEADER_LEN: usize = 2 + 2 + 2 + 4 + NAME_FIELD_LEN;

/// Maximum payload this implementation will allocate for a single frame.
/// Guards against a malformed `payload_length` exhausting memory.
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// The fixed-size frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub msg_type: MessageType,
    pub source: u16,
    pub dest: u16,
    pub payload_length: u32,
    name: [u8; NAME_FIELD_LEN],
}

impl FrameHeader {
    pub fn new(msg_type: MessageType, source: u16, dest: u16, name: &str, payload_length: u32) -> Self {
        let mut buf = [0u8; NAME_FIELD_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_FIELD_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self { msg_type, source, dest, payload_length, name: buf }
    }

    /// The name field decoded up to its first NUL byte, lossily as UTF-8.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    fn encode(&self) -> io::Result<[u8; HEADER_LEN]> {
        let mut buf = [0u8; HEADER_LEN];
        let msg_type = self
            .msg_type
            .to_u16()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad msg_type"))?;
        LittleEndian::write_u16(&mut buf[0..2], msg_type);
        LittleEndian::write_u16(&mut buf[2..4], self.source);
        LittleEndian::write_u16(&mut buf[4..6], self.dest);
        LittleEndian::write_u32(&mut buf[6..10], self.payload_length);
        buf[10..10 + NAME_FIELD_LEN].copy_from_slice(&self.name);
        Ok(buf)
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> io::Result<Self> {
        let raw_type = LittleEndian::read_u16(&buf[0..2]);
        let msg_type = MessageType::from_u16(raw_type)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown msg_type"))?;
        let source = LittleEndian::read_u16(&buf[2..4]);
        let dest = LittleEndian::read_u16(&buf[4..6]);
        let payload_length = LittleEndian::read_u32(&buf[6..10]);
        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&buf[10..10 + NAME_FIELD_LEN]);
        Ok(Self { msg_type, source, dest, payload_length, name })
    }
}

/// A fully read frame: header plus its opaque payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MessageType, source: u16, dest: u16, name: &str, payload: Vec<u8>) -> Self {
        let header = FrameHeader::new(msg_type, source, dest, name, payload.len() as u32);
        Self { header, payload }
    }

    pub fn empty(msg_type: MessageType, source: u16, dest: u16, name: &str) -> Self {
        Self::new(msg_type, source, dest, name, Vec::new())
    }

    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    pub fn name(&self) -> String {
        self.header.name()
    }
}

/// Reads one complete frame from `stream`.
pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Frame> {
    let mut header_buf = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&header_buf)?;

    if header.payload_length > MAX_PAYLOAD_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "payload too large"));
    }

    let mut payload = vec![0u8; header.payload_length as usize];
    stream.read_exact(&mut payload).await?;

    Ok(Frame { header, payload })
}

/// Writes one complete frame to `stream`.
pub async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, frame: &Frame) -> io::Result<()> {
    let header_buf = frame.header.encode()?;
    stream.write_all(&header_buf).await?;
    stream.write_all(&frame.payload).await?;
    stream.flush().await
}
