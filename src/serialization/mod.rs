//! Pluggable serialization backends for frame bodies.
//!
//! A [`Serialization`] turns request/response envelopes into the opaque
//! bytes carried after the frame header. The backend is chosen per call by
//! name; the name travels in the header's 16-byte serialization field so the
//! receiving side can pick the matching decoder.
//!
//! Built-ins registered with [`crate::extension::Extensions`]:
//!
//! - `json` (default) - [`JsonSerialization`]
//! - `msgpack` - [`MsgPackSerialization`]

mod json;
mod msgpack;

pub use json::JsonSerialization;
pub use msgpack::MsgPackSerialization;

use crate::error::Result;
use crate::message::{RpcRequest, RpcResponse};

/// Bytes-in/bytes-out contract for frame bodies.
pub trait Serialization: Send + Sync {
    /// Name carried in the frame header (at most 16 NUL-free ASCII bytes).
    fn name(&self) -> &'static str;

    fn encode_request(&self, request: &RpcRequest) -> Result<Vec<u8>>;

    fn decode_request(&self, bytes: &[u8]) -> Result<RpcRequest>;

    fn encode_response(&self, response: &RpcResponse) -> Result<Vec<u8>>;

    fn decode_response(&self, bytes: &[u8]) -> Result<RpcResponse>;
}
