//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Incoming bytes are
//! appended and complete frames are split off; until a whole frame (header
//! plus body) is buffered, nothing is consumed, so decoding resumes cleanly
//! at any split point - byte-at-a-time feeding included.

use super::wire_format::{Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{Result, RpcError};
use bytes::BytesMut;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed body size.
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with default settings (64 KB capacity, 64 MB body cap).
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a frame buffer with a custom body size cap.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_body_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming socket data. Fragmented
    /// input is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error on a magic mismatch or an oversized body.
    /// Both are fatal for the stream; the caller must drop the connection.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// The header is only peeked until the full body has arrived, so a
    /// partial frame leaves the buffer untouched.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Header::decode(&self.buffer[..HEADER_SIZE])?;

        if header.body_len > self.max_body_size {
            return Err(RpcError::Protocol(format!(
                "body size {} exceeds maximum {}",
                header.body_len, self.max_body_size
            )));
        }

        let total = HEADER_SIZE + header.body_len as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let mut frame_bytes = self.buffer.split_to(total);
        let body = frame_bytes.split_off(HEADER_SIZE).freeze();
        Ok(Some(Frame::new(header, body)))
    }

    /// Number of buffered bytes not yet forming a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{MessageType, Status};
    use crate::protocol::build_frame;

    fn make_frame_bytes(request_id: u64, body: &[u8]) -> Vec<u8> {
        let header = Header::new(
            MessageType::Request,
            Status::Success,
            request_id,
            "json",
            body.len() as u32,
        )
        .unwrap();
        build_frame(&header, body).to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id(), 42);
        assert_eq!(&frames[0].body[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut data = Vec::new();
        for id in 1..=3u64 {
            data.extend_from_slice(&make_frame_bytes(id, b"body"));
        }

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].request_id(), 1);
        assert_eq!(frames[2].request_id(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_header_consumes_nothing() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(42, b"test");

        let frames = buffer.push(&bytes[..5]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_body_consumes_nothing() {
        let mut buffer = FrameBuffer::new();
        let body = b"a body long enough to split";
        let bytes = make_frame_bytes(42, body);

        let split = HEADER_SIZE + 10;
        let frames = buffer.push(&bytes[..split]).unwrap();
        assert!(frames.is_empty());
        // Header stays buffered until the body completes.
        assert_eq!(buffer.len(), split);

        let frames = buffer.push(&bytes[split..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].body[..], body);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(42, b"hi");

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].request_id(), 42);
        assert_eq!(&all_frames[0].body[..], b"hi");
    }

    #[test]
    fn test_empty_body() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(1, b"")).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = make_frame_bytes(1, b"x");
        bytes[0] = 0x7F;

        let err = buffer.push(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_max_body_validation() {
        let mut buffer = FrameBuffer::with_max_body(100);
        let header =
            Header::new(MessageType::Request, Status::Success, 1, "json", 1000).unwrap();

        let result = buffer.push(&header.encode());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();
        let frame1 = make_frame_bytes(1, b"first");
        let frame2 = make_frame_bytes(2, b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..7]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id(), 1);

        let frames = buffer.push(&frame2[7..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id(), 2);
    }

    #[test]
    fn test_clear_discards_partial_input() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, b"test");
        buffer.push(&bytes[..10]).unwrap();
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
