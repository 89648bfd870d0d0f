//! MessagePack serialization backend using `rmp-serde`.
//!
//! Encoding uses `to_vec_named` so envelopes serialize as maps keyed by
//! field name rather than positional arrays. Positional encoding would make
//! the wire format break whenever an envelope gains a field.

use super::Serialization;
use crate::error::Result;
use crate::message::{RpcRequest, RpcResponse};

/// MessagePack backend; denser than JSON for the same envelopes.
pub struct MsgPackSerialization;

impl Serialization for MsgPackSerialization {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode_request(&self, request: &RpcRequest) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(request)?)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<RpcRequest> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    fn encode_response(&self, response: &RpcResponse) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(response)?)
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<RpcResponse> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
