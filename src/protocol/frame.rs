//! A decoded frame: header plus opaque body bytes.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, MessageType};

/// A complete frame extracted from the byte stream.
///
/// The body is still opaque at this layer; the codec decodes it with the
/// serializer named in the header.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub body: Bytes,
}

impl Frame {
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    #[inline]
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }
}

/// Encode a header and body into one contiguous buffer.
///
/// Mostly useful in tests; the hot path hands header and body to the writer
/// task separately so the body bytes are never copied.
pub fn build_frame(header: &Header, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(super::HEADER_SIZE + body.len());
    header.encode_into(&mut buf);
    buf.extend_from_slice(body);
    buf.freeze()
}
