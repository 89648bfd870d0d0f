//! JSON serialization backend using `serde_json`.

use super::Serialization;
use crate::error::Result;
use crate::message::{RpcRequest, RpcResponse};

/// JSON backend; the default because it is trivially inspectable on the wire.
pub struct JsonSerialization;

impl Serialization for JsonSerialization {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_request(&self, request: &RpcRequest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<RpcRequest> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_response(&self, response: &RpcResponse) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<RpcResponse> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::test_support;

    #[test]
    fn test_request_roundtrip() {
        let request = test_support::request();
        let bytes = JsonSerialization.encode_request(&request).unwrap();
        assert_eq!(JsonSerialization.decode_request(&bytes).unwrap(), request);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = test_support::response();
        let bytes = JsonSerialization.encode_response(&response).unwrap();
        assert_eq!(JsonSerialization.decode_response(&bytes).unwrap(), response);
    }

    #[test]
    fn test_decode_error_on_garbage() {
        assert!(JsonSerialization.decode_request(b"not json").is_err());
    }
}
