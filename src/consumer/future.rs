//! Completion futures for in-flight requests and the caller-side context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};
use crate::message::RpcResponse;

/// One in-flight request awaiting its response frame.
pub(crate) struct PendingEntry {
    pub tx: oneshot::Sender<RpcResponse>,
    pub service: String,
    pub method: String,
    pub started: Instant,
}

/// Correlation table: request id -> pending entry. Shared between the send
/// path and the connection's read loop.
pub(crate) type PendingTable = Arc<Mutex<HashMap<u64, PendingEntry>>>;

pub(crate) fn lock_pending(pending: &PendingTable) -> std::sync::MutexGuard<'_, HashMap<u64, PendingEntry>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to a response that has not arrived yet.
///
/// Serves both calling modes: a sync call awaits [`RpcFuture::wait`]
/// immediately, an async call parks the future in an [`RpcContext`] and
/// awaits it later.
pub struct RpcFuture {
    pub(crate) rx: oneshot::Receiver<RpcResponse>,
    pub(crate) request_id: u64,
    pub(crate) service: String,
    pub(crate) method: String,
    pub(crate) pending: PendingTable,
}

impl RpcFuture {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the response, up to `timeout`.
    ///
    /// On timeout the pending entry is removed, so a response that arrives
    /// later is dropped as unmatched instead of completing a dead call.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Timeout`] naming the request id, service and method;
    /// - [`RpcError::Remote`] when the provider answered with a failure;
    /// - [`RpcError::ConnectionClosed`] when the connection died first.
    pub async fn wait(self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => match response.error {
                Some(error) => Err(RpcError::Remote(error)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                lock_pending(&self.pending).remove(&self.request_id);
                Err(RpcError::Timeout {
                    request_id: self.request_id,
                    service: self.service,
                    method: self.method,
                })
            }
        }
    }
}

/// Caller-side slot that carries the future of an async-mode call.
///
/// Explicitly constructed and passed along with the proxy; a call made in
/// async mode deposits its [`RpcFuture`] here and the caller takes it out
/// when it is ready to await the result.
#[derive(Default)]
pub struct RpcContext {
    slot: Mutex<Option<RpcFuture>>,
}

impl RpcContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_future(&self, future: RpcFuture) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(future);
    }

    /// Take the most recently deposited future, leaving the slot empty.
    pub fn take_future(&self) -> Option<RpcFuture> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }
}
