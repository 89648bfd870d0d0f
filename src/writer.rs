//! Dedicated writer task for outbound frames.
//!
//! Each connection owns one writer task fed through a bounded mpsc channel;
//! the consumer and provider engines never hold a lock around the socket.
//! The channel bound is the backpressure mechanism: when the queue is full,
//! senders wait up to a timeout for a slot instead of buffering without
//! limit. The task coalesces queued frames into one contiguous buffer per
//! write, so a burst of small responses costs one syscall, not one each.
//!
//! ```text
//! caller 1 ─┐
//! caller 2 ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► TcpStream
//! caller N ─┘
//! ```

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, RpcError};
use crate::protocol::{Header, HEADER_SIZE};

/// Default frame-queue capacity; a full queue applies backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time a sender waits for a queue slot before giving up.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on bytes coalesced into a single write.
const MAX_COALESCED_BYTES: usize = 64 * 1024;

/// A frame ready to be written: encoded header plus body bytes.
#[derive(Debug)]
pub struct OutboundFrame {
    pub header: [u8; HEADER_SIZE],
    pub body: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(header: &Header, body: Bytes) -> Self {
        Self {
            header: header.encode(),
            body,
        }
    }

    /// Total size on the wire (header + body).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Frame-queue capacity; a full queue makes senders wait.
    pub channel_capacity: usize,
    /// How long a sender waits for a queue slot.
    pub send_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Cheaply cloneable handle for sending frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    send_timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// # Errors
    ///
    /// - [`RpcError::BackpressureTimeout`] when the queue stays full past
    ///   the configured send timeout;
    /// - [`RpcError::ConnectionClosed`] when the writer task is gone.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => Err(RpcError::BackpressureTimeout),
        }
    }
}

/// Spawn the writer task for a connection's write half.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let handle = WriterHandle {
        tx,
        send_timeout: config.send_timeout,
    };
    let task = tokio::spawn(writer_loop(rx, writer));
    (handle, task)
}

/// Receives frames and writes them coalesced until the channel closes.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_COALESCED_BYTES);

    loop {
        let first = match rx.recv().await {
            Some(frame) => frame,
            // Channel closed, clean shutdown.
            None => return Ok(()),
        };

        buf.clear();
        append_frame(&mut buf, &first);
        // Fold in whatever else is already queued, up to the coalesce cap.
        while buf.len() < MAX_COALESCED_BYTES {
            match rx.try_recv() {
                Ok(frame) => append_frame(&mut buf, &frame),
                Err(_) => break,
            }
        }

        writer.write_all(&buf).await?;
        writer.flush().await?;
    }
}

#[inline]
fn append_frame(buf: &mut BytesMut, frame: &OutboundFrame) {
    buf.reserve(frame.size());
    buf.put_slice(&frame.header);
    buf.put_slice(&frame.body);
}
