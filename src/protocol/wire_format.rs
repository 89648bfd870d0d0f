//! Binary wire format - the 32-byte frame header.
//!
//! Every frame starts with a fixed 32-byte header, all integers big-endian:
//!
//! ```text
//! ┌─────────┬──────────┬────────┬────────────┬───────────────────┬──────────┐
//! │ magic   │ msg_type │ status │ request_id │ serialization     │ body_len │
//! │ i16     │ u8       │ u8     │ u64        │ 16 bytes, padded  │ u32      │
//! └─────────┴──────────┴────────┴────────────┴───────────────────┴──────────┘
//!   2 bytes   1 byte     1 byte   8 bytes      16 bytes            4 bytes
//! ```
//!
//! The serialization field carries the serializer name right-padded with NUL
//! bytes to exactly 16 bytes. Names must therefore be NUL-free ASCII of at
//! most 16 bytes; the constraint is enforced when a header is built.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, RpcError};

/// Magic number identifying a wirecall frame.
pub const MAGIC: i16 = 0x10;

/// Total header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// Width of the serialization-name field.
pub const SERIALIZATION_FIELD_LEN: usize = 16;

/// Filler byte for the serialization-name field.
pub const PAD_BYTE: u8 = 0x00;

/// Default maximum body size (64 MB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Frame kind carried in the `msg_type` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 1,
    Response = 2,
    Heartbeat = 3,
}

impl MessageType {
    /// Map a raw header byte to a known message type.
    ///
    /// Unknown values return `None`; the codec drops such frames silently.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Response outcome carried in the `status` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0,
    Fail = 1,
}

/// Frame header (32 bytes on the wire).
///
/// `msg_type` is kept as the raw byte so that frames with unknown types can
/// be decoded far enough to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: u8,
    pub status: u8,
    pub request_id: u64,
    pub serialization: [u8; SERIALIZATION_FIELD_LEN],
    pub body_len: u32,
}

impl Header {
    /// Create a header, padding the serializer name to 16 bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the serializer name is empty, longer than
    /// 16 bytes, or contains non-ASCII or NUL bytes.
    pub fn new(
        msg_type: MessageType,
        status: Status,
        request_id: u64,
        serialization: &str,
        body_len: u32,
    ) -> Result<Self> {
        Ok(Self {
            msg_type: msg_type as u8,
            status: status as u8,
            request_id,
            serialization: pad_serialization(serialization)?,
            body_len,
        })
    }

    /// Encode the header into a fixed-size array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&MAGIC.to_be_bytes());
        buf[2] = self.msg_type;
        buf[3] = self.status;
        buf[4..12].copy_from_slice(&self.request_id.to_be_bytes());
        buf[12..28].copy_from_slice(&self.serialization);
        buf[28..32].copy_from_slice(&self.body_len.to_be_bytes());
        buf
    }

    /// Append the encoded header to a buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE);
        buf.put_slice(&self.encode());
    }

    /// Decode a header from exactly `HEADER_SIZE` leading bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error on short input or a magic mismatch. A bad
    /// magic number means the stream is not speaking this protocol and must
    /// be torn down.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RpcError::Protocol(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let magic = buf.get_i16();
        if magic != MAGIC {
            return Err(RpcError::Protocol(format!(
                "bad magic 0x{magic:04x}, expected 0x{MAGIC:04x}"
            )));
        }

        let msg_type = buf.get_u8();
        let status = buf.get_u8();
        let request_id = buf.get_u64();
        let mut serialization = [0u8; SERIALIZATION_FIELD_LEN];
        buf.copy_to_slice(&mut serialization);
        let body_len = buf.get_u32();

        Ok(Self {
            msg_type,
            status,
            request_id,
            serialization,
            body_len,
        })
    }

    /// The message type, if the raw byte maps to a known one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    /// Whether the status byte marks a failure.
    pub fn is_fail(&self) -> bool {
        self.status == Status::Fail as u8
    }

    /// The serializer name with trailing padding stripped.
    pub fn serialization_name(&self) -> Result<&str> {
        strip_serialization(&self.serialization)
    }
}

/// Pad a serializer name to the fixed field width with NUL bytes.
pub fn pad_serialization(name: &str) -> Result<[u8; SERIALIZATION_FIELD_LEN]> {
    validate_serialization_name(name)?;
    let mut field = [PAD_BYTE; SERIALIZATION_FIELD_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

/// Strip trailing padding from a serialization field.
///
/// Only trailing NULs are removed, so a name can never lose interior bytes.
pub fn strip_serialization(field: &[u8; SERIALIZATION_FIELD_LEN]) -> Result<&str> {
    let end = field
        .iter()
        .rposition(|&b| b != PAD_BYTE)
        .map(|p| p + 1)
        .unwrap_or(0);
    let name = std::str::from_utf8(&field[..end])
        .map_err(|_| RpcError::Protocol("serialization name is not valid UTF-8".into()))?;
    if name.is_empty() {
        return Err(RpcError::Protocol("empty serialization name".into()));
    }
    Ok(name)
}

/// Check that a serializer name fits the wire field.
pub fn validate_serialization_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RpcError::Config("serializer name must not be empty".into()));
    }
    if name.len() > SERIALIZATION_FIELD_LEN {
        return Err(RpcError::Config(format!(
            "serializer name `{name}` exceeds {SERIALIZATION_FIELD_LEN} bytes"
        )));
    }
    if !name.bytes().all(|b| b.is_ascii() && b != PAD_BYTE) {
        return Err(RpcError::Config(format!(
            "serializer name `{name}` must be NUL-free ASCII"
        )));
    }
    Ok(())
}
