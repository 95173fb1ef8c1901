//! Binary frame message types (spec §4.1, §6).

use num_derive::{FromPrimitive, ToPrimitive};

/// Discriminant carried in [`super::frame::FrameHeader::msg_type`].
///
/// Decoded off the wire with `num_traits::FromPrimitive`, encoded with
/// `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum MessageType {
    RegisterClient = 1,
    Register = 2,
    RegisterFile = 3,
    RegisterComplete = 4,
    Ack = 5,
    Error = 6,

    Create = 10,
    Delete = 11,
    Undo = 12,

    Read = 20,
    Write = 21,
    Stream = 22,
    Checkpoint = 23,
    ViewCheckpoint = 24,
    Revert = 25,
    ListCheckpoints = 26,
    LocateFile = 27,

    ReadRedirect = 30,
    LocateResponse = 31,

    AddAccess = 40,
    RemAccess = 41,

    InternalRead = 50,
    InternalData = 51,
    InternalGetMetadata = 52,
    InternalMetadataResp = 53,
    InternalAddAccess = 54,
    InternalRemAccess = 55,
    InternalSetOwner = 56,
    InternalSetFolder = 57,
    InternalDelete = 58,
    InternalRename = 69,

    Info = 60,
    InfoResponse = 61,
    View = 62,
    ViewFolder = 63,
    ListResponse = 64,
    ViewResponse = 65,

    Exec = 70,

    SsDeadReport = 80,

    Rename = 90,
    MoveFolder = 91,
}
