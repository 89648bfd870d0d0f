//! Typed codec - maps raw frames to request/response envelopes.
//!
//! Sits between the byte-level protocol layer and the engines: encoding
//! builds a header plus serialized body for the writer task, decoding
//! resolves the serializer named in the header through the extension
//! registry and produces an [`RpcMessage`]. Frames with an unknown message
//! type decode to `None` and are dropped by the caller.

use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::extension::Extensions;
use crate::message::{RpcRequest, RpcResponse};
use crate::protocol::{Frame, Header, MessageType, Status};
use crate::serialization::Serialization;
use crate::writer::OutboundFrame;

/// A frame decoded far enough to be routed.
#[derive(Debug)]
pub enum RpcMessage {
    Request { header: Header, body: RpcRequest },
    Response { header: Header, body: RpcResponse },
    /// Decoded and then ignored by both engines.
    Heartbeat { header: Header },
}

/// Encode a request into an outbound frame.
///
/// Requests carry `Status::Success`; the byte only becomes meaningful on the
/// response path.
pub fn encode_request(
    request_id: u64,
    serialization: &dyn Serialization,
    request: &RpcRequest,
) -> Result<OutboundFrame> {
    let body = serialization.encode_request(request)?;
    let header = Header::new(
        MessageType::Request,
        Status::Success,
        request_id,
        serialization.name(),
        body.len() as u32,
    )?;
    Ok(OutboundFrame::new(&header, Bytes::from(body)))
}

/// Encode a response, deriving its header from the request's.
///
/// The request header is reused with the message type reassigned to
/// response, so the correlation id and serializer name carry over untouched.
pub fn encode_response(
    request_header: &Header,
    serialization: &dyn Serialization,
    response: &RpcResponse,
) -> Result<OutboundFrame> {
    let body = serialization.encode_response(response)?;

    let mut header = *request_header;
    header.msg_type = MessageType::Response as u8;
    header.status = if response.error.is_some() {
        Status::Fail as u8
    } else {
        Status::Success as u8
    };
    header.body_len = body.len() as u32;

    Ok(OutboundFrame::new(&header, Bytes::from(body)))
}

/// Decode a frame into a typed message.
///
/// # Errors
///
/// Fails when the serializer named in the header is unknown or the body does
/// not deserialize. Unknown message types are not errors; they yield
/// `Ok(None)`.
pub fn decode(frame: &Frame, extensions: &Extensions) -> Result<Option<RpcMessage>> {
    let header = frame.header;
    let msg_type = match header.message_type() {
        Some(t) => t,
        None => {
            debug!(
                msg_type = header.msg_type,
                request_id = header.request_id,
                "dropping frame with unknown message type"
            );
            return Ok(None);
        }
    };

    if msg_type == MessageType::Heartbeat {
        return Ok(Some(RpcMessage::Heartbeat { header }));
    }

    let serialization = extensions.serialization(header.serialization_name()?)?;
    let message = match msg_type {
        MessageType::Request => RpcMessage::Request {
            header,
            body: serialization.decode_request(&frame.body)?,
        },
        MessageType::Response => RpcMessage::Response {
            header,
            body: serialization.decode_response(&frame.body)?,
        },
        MessageType::Heartbeat => unreachable!("handled above"),
    };
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{test_support, JsonSerialization};
    use serde_json::json;

    fn frame_from(outbound: &OutboundFrame) -> Frame {
        let header = Header::decode(&outbound.header).unwrap();
        Frame::new(header, outbound.body.clone())
    }

    #[test]
    fn test_request_roundtrip_through_codec() {
        let extensions = Extensions::with_builtins();
        let request = test_support::request();
        let outbound = encode_request(7, &JsonSerialization, &request).unwrap();

        let decoded = decode(&frame_from(&outbound), &extensions).unwrap();
        match decoded {
            Some(RpcMessage::Request { header, body }) => {
                assert_eq!(header.request_id, 7);
                assert_eq!(header.serialization_name().unwrap(), "json");
                assert_eq!(body, request);
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_response_header_derived_from_request() {
        let extensions = Extensions::with_builtins();
        let request = test_support::request();
        let request_frame = encode_request(42, &JsonSerialization, &request).unwrap();
        let request_header = Header::decode(&request_frame.header).unwrap();

        let response = RpcResponse::success(json!("hello world"), &request);
        let outbound = encode_response(&request_header, &JsonSerialization, &response).unwrap();
        let header = Header::decode(&outbound.header).unwrap();

        assert_eq!(header.message_type(), Some(MessageType::Response));
        assert_eq!(header.request_id, 42);
        assert_eq!(header.serialization_name().unwrap(), "json");
        assert!(!header.is_fail());

        match decode(&Frame::new(header, outbound.body.clone()), &extensions).unwrap() {
            Some(RpcMessage::Response { body, .. }) => assert_eq!(body, response),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_response_sets_fail_status() {
        let request = test_support::request();
        let request_frame = encode_request(1, &JsonSerialization, &request).unwrap();
        let request_header = Header::decode(&request_frame.header).unwrap();

        let response = RpcResponse::failure("service not found: X", &request);
        let outbound = encode_response(&request_header, &JsonSerialization, &response).unwrap();
        assert!(Header::decode(&outbound.header).unwrap().is_fail());
    }

    #[test]
    fn test_unknown_message_type_is_dropped() {
        let extensions = Extensions::with_builtins();
        let request = test_support::request();
        let outbound = encode_request(1, &JsonSerialization, &request).unwrap();
        let mut header = Header::decode(&outbound.header).unwrap();
        header.msg_type = 200;

        let decoded = decode(&Frame::new(header, outbound.body.clone()), &extensions).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_heartbeat_passes_through() {
        let extensions = Extensions::with_builtins();
        let header =
            Header::new(MessageType::Heartbeat, Status::Success, 3, "json", 0).unwrap();
        match decode(&Frame::new(header, Bytes::new()), &extensions).unwrap() {
            Some(RpcMessage::Heartbeat { header }) => assert_eq!(header.request_id, 3),
            other => panic!("expected heartbeat, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_serializer_is_error() {
        let extensions = Extensions::with_builtins();
        let header =
            Header::new(MessageType::Request, Status::Success, 1, "protobuf", 0).unwrap();
        assert!(decode(&Frame::new(header, Bytes::new()), &extensions).is_err());
    }
}
