//! Binary frame wire protocol shared by Client↔Directory and
//! Directory↔Node links (spec §4.1, §6).

pub mod frame;
pub mod message;
pub mod payload;

pub use frame::{read_frame, write_frame, Frame, FrameHeader, HEADER_LEN};
pub use message::MessageType;
