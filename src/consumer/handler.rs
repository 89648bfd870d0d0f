//! Per-connection consumer handler: write path, read loop, correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::future::{lock_pending, PendingEntry, PendingTable, RpcFuture};
use super::ConsumerConfig;
use crate::codec::{self, RpcMessage};
use crate::error::Result;
use crate::extension::Extensions;
use crate::message::{next_request_id, RpcRequest, RpcResponse};
use crate::protocol::FrameBuffer;
use crate::serialization::Serialization;
use crate::writer::{spawn_writer_task, WriterHandle};

/// One pooled connection to a provider endpoint.
///
/// Owns the writer task and the pending-request table; a spawned read loop
/// correlates response frames back to their futures. `is_active` turns false
/// once the read loop exits, which is the consumer's signal to evict and
/// reconnect.
pub struct ConsumerHandler {
    endpoint: String,
    writer: WriterHandle,
    pending: PendingTable,
    active: Arc<AtomicBool>,
}

impl ConsumerHandler {
    /// Connect to `endpoint` (`addr:port`) and spawn the connection's tasks.
    pub async fn connect(
        endpoint: &str,
        config: &ConsumerConfig,
        extensions: Arc<Extensions>,
    ) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (writer, _writer_task) = spawn_writer_task(write_half, config.writer.clone());
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let active = Arc::new(AtomicBool::new(true));

        let handler = Arc::new(Self {
            endpoint: endpoint.to_string(),
            writer,
            pending: pending.clone(),
            active: active.clone(),
        });

        tokio::spawn(read_loop(
            read_half,
            handler.endpoint.clone(),
            pending,
            active,
            extensions,
            config.slow_response_threshold,
        ));

        debug!(endpoint, "connected");
        Ok(handler)
    }

    /// Whether the connection's read loop is still running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a request over this connection.
    ///
    /// One-way requests are written and forgotten (`Ok(None)`); anything
    /// else gets a pending entry and an [`RpcFuture`] for the response.
    pub async fn send(
        &self,
        serialization: &dyn Serialization,
        request: &RpcRequest,
    ) -> Result<Option<RpcFuture>> {
        let request_id = next_request_id();
        let frame = codec::encode_request(request_id, serialization, request)?;

        if request.oneway {
            self.writer.send(frame).await?;
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(
            request_id,
            PendingEntry {
                tx,
                service: request.service_name.clone(),
                method: request.method_name.clone(),
                started: Instant::now(),
            },
        );

        if let Err(e) = self.writer.send(frame).await {
            lock_pending(&self.pending).remove(&request_id);
            return Err(e);
        }

        Ok(Some(RpcFuture {
            rx,
            request_id,
            service: request.service_name.clone(),
            method: request.method_name.clone(),
            pending: self.pending.clone(),
        }))
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    endpoint: String,
    pending: PendingTable,
    active: Arc<AtomicBool>,
    extensions: Arc<Extensions>,
    slow_threshold: Duration,
) {
    let mut buffer = FrameBuffer::new();
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!(%endpoint, "connection closed by peer");
                break;
            }
            Ok(n) => {
                let frames = match buffer.push(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!(%endpoint, error = %e, "protocol error, dropping connection");
                        break;
                    }
                };
                for frame in frames {
                    match codec::decode(&frame, &extensions) {
                        Ok(Some(RpcMessage::Response { header, body })) => {
                            complete_response(&pending, header.request_id, body, slow_threshold);
                        }
                        Ok(Some(RpcMessage::Heartbeat { header })) => {
                            debug!(%endpoint, request_id = header.request_id, "heartbeat");
                        }
                        Ok(Some(RpcMessage::Request { header, .. })) => {
                            debug!(
                                %endpoint,
                                request_id = header.request_id,
                                "dropping unexpected request frame"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(%endpoint, error = %e, "failed to decode frame");
                        }
                    }
                }
            }
            Err(e) => {
                error!(%endpoint, error = %e, "read failed");
                break;
            }
        }
    }

    active.store(false, Ordering::Release);
    // Dropping the entries wakes every waiter with ConnectionClosed.
    lock_pending(&pending).clear();
}

/// Hand a response to its waiting future, if any.
pub(crate) fn complete_response(
    pending: &PendingTable,
    request_id: u64,
    response: RpcResponse,
    slow_threshold: Duration,
) {
    let entry = lock_pending(pending).remove(&request_id);
    match entry {
        Some(entry) => {
            let elapsed = entry.started.elapsed();
            if elapsed > slow_threshold {
                warn!(
                    request_id,
                    service = %entry.service,
                    method = %entry.method,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow response"
                );
            }
            // The waiter may have timed out between remove and send.
            let _ = entry.tx.send(response);
        }
        None => {
            debug!(request_id, "dropping response with no pending request");
        }
    }
}
