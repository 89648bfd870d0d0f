//! Consumer engine - discovery, connection pooling and request sending.
//!
//! A call flows discover -> select -> get-or-create connection -> send. The
//! connection pool is keyed by `addr:port`; a handler whose read loop has
//! exited is evicted and the endpoint redialed on the next call.

mod future;
mod handler;

pub use future::{RpcContext, RpcFuture};
pub use handler::ConsumerHandler;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::loadbalancer::ConnectionTracker;
use crate::message::{routing_hash, RpcRequest};
use crate::registry::ServiceRegistry;
use crate::writer::WriterConfig;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Responses slower than this are logged as warnings.
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_millis(5000);

/// Consumer-side tuning knobs.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Default timeout applied by sync-mode calls.
    pub request_timeout: Duration,
    /// Threshold for the slow-response warning log.
    pub slow_response_threshold: Duration,
    /// This process's address, fed to source-IP-affine load balancers.
    pub source_ip: Option<String>,
    /// Writer-task settings for every pooled connection.
    pub writer: WriterConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            slow_response_threshold: SLOW_RESPONSE_THRESHOLD,
            source_ip: None,
            writer: WriterConfig::default(),
        }
    }
}

/// One pool entry; its async mutex serializes dials to a single endpoint.
type EndpointSlot = Arc<tokio::sync::Mutex<Option<Arc<ConsumerHandler>>>>;

/// The consumer engine: owns the connection pool.
pub struct RpcConsumer {
    extensions: Arc<Extensions>,
    config: ConsumerConfig,
    endpoints: Mutex<HashMap<String, EndpointSlot>>,
    tracker: Arc<ConnectionTracker>,
}

impl RpcConsumer {
    pub fn new(extensions: Arc<Extensions>, config: ConsumerConfig) -> Self {
        let tracker = extensions.connection_tracker();
        Self {
            extensions,
            config,
            endpoints: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Discover a provider for the request and send it.
    ///
    /// Returns `Ok(None)` for one-way requests, otherwise the response
    /// future. Fails with [`RpcError::NoInstanceAvailable`] when discovery
    /// comes up empty.
    pub async fn send_request(
        &self,
        registry: &Arc<dyn ServiceRegistry>,
        serialization_name: &str,
        request: RpcRequest,
    ) -> Result<Option<RpcFuture>> {
        let service_key = request.service_key();
        let hash = routing_hash(&request);

        let meta = registry
            .discover(&service_key, hash, self.config.source_ip.as_deref())
            .await?
            .ok_or_else(|| RpcError::NoInstanceAvailable(service_key.clone()))?;

        let serialization = self.extensions.serialization(serialization_name)?;
        let handler = self.handler_for(&meta.endpoint()).await?;
        handler.send(serialization.as_ref(), &request).await
    }

    /// Get the pooled connection for an endpoint, reconnecting if the cached
    /// one has gone inactive.
    ///
    /// The pool map is only locked long enough to fetch the endpoint's slot;
    /// the dial itself holds that slot's own lock, so an endpoint is dialed
    /// once at a time while calls to other endpoints proceed.
    async fn handler_for(&self, endpoint: &str) -> Result<Arc<ConsumerHandler>> {
        let slot = {
            let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
            endpoints.entry(endpoint.to_string()).or_default().clone()
        };
        let mut slot = slot.lock().await;

        if let Some(handler) = slot.as_ref() {
            if handler.is_active() {
                return Ok(handler.clone());
            }
            debug!(endpoint, "evicting inactive connection");
            *slot = None;
        }

        match ConsumerHandler::connect(endpoint, &self.config, self.extensions.clone()).await {
            Ok(handler) => {
                self.tracker.record(endpoint);
                *slot = Some(handler.clone());
                Ok(handler)
            }
            Err(e) => {
                error!(endpoint, error = %e, "failed to connect");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn counting_listener() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                sockets.push(socket);
            }
        });
        (endpoint, accepted)
    }

    fn consumer() -> Arc<RpcConsumer> {
        let extensions = Arc::new(Extensions::with_builtins());
        Arc::new(RpcConsumer::new(extensions, ConsumerConfig::default()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_connection() {
        let (endpoint, accepted) = counting_listener().await;
        let consumer = consumer();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let consumer = consumer.clone();
                let endpoint = endpoint.clone();
                tokio::spawn(async move { consumer.handler_for(&endpoint).await.unwrap() })
            })
            .collect();

        let mut handlers = Vec::new();
        for task in tasks {
            handlers.push(task.await.unwrap());
        }

        for handler in &handlers[1..] {
            assert!(Arc::ptr_eq(&handlers[0], handler));
        }

        // Give the accept task a moment to observe the (single) connection.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_endpoints_get_distinct_connections() {
        let (endpoint_a, _) = counting_listener().await;
        let (endpoint_b, _) = counting_listener().await;
        let consumer = consumer();

        let a = consumer.handler_for(&endpoint_a).await.unwrap();
        let b = consumer.handler_for(&endpoint_b).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.endpoint(), endpoint_a);
        assert_eq!(b.endpoint(), endpoint_b);
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_pool_usable() {
        let consumer = consumer();

        // A port nothing listens on; the dial is refused.
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(consumer.handler_for(&dead).await.is_err());

        let (endpoint, _) = counting_listener().await;
        assert!(consumer.handler_for(&endpoint).await.is_ok());
    }
}
