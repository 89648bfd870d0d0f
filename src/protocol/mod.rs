//! Wire protocol layer - header layout, frames and the resumable decoder.
//!
//! This layer deals in raw bytes only. Mapping frame bodies to request and
//! response envelopes happens in [`crate::codec`].

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    pad_serialization, strip_serialization, validate_serialization_name, Header, MessageType,
    Status, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, MAGIC, PAD_BYTE, SERIALIZATION_FIELD_LEN,
};
