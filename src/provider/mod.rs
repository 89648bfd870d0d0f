//! Provider engine - hosts services behind the wire protocol.
//!
//! The server accepts connections, decodes request frames and pushes each
//! request through a bounded worker pool into the dispatch path: service
//! lookup by key, method invocation through the configured invoker, and a
//! response frame written back unless the request was one-way.

mod service;

pub use service::{MethodFn, ServiceHandler};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, RpcMessage};
use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::invoker::MethodInvoker;
use crate::message::{service_key, RpcRequest, RpcResponse};
use crate::protocol::{FrameBuffer, Header};
use crate::registry::{build_registry, RegistryConfig, ServiceMeta, ServiceRegistry};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default worker-pool size.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// What happens to a request when every worker permit is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverloadPolicy {
    /// Wait for a permit; the connection's dispatch stalls meanwhile.
    #[default]
    Block,
    /// Fail fast with a busy response.
    Reject,
}

/// Provider-side tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_workers: usize,
    pub overload_policy: OverloadPolicy,
    pub writer: WriterConfig,
    pub max_body_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            overload_policy: OverloadPolicy::default(),
            writer: WriterConfig::default(),
            max_body_size: crate::protocol::DEFAULT_MAX_BODY_SIZE,
        }
    }
}

struct ServiceSpec {
    name: String,
    version: String,
    group: String,
    weight: u32,
}

/// Builder for [`RpcServer`].
pub struct RpcServerBuilder {
    bind_addr: String,
    registry: Option<Arc<dyn ServiceRegistry>>,
    registry_config: RegistryConfig,
    invoker_name: String,
    config: ServerConfig,
    extensions: Option<Arc<Extensions>>,
    services: Vec<(ServiceSpec, ServiceHandler)>,
}

impl RpcServerBuilder {
    fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            registry: None,
            registry_config: RegistryConfig::default(),
            invoker_name: String::new(),
            config: ServerConfig::default(),
            extensions: None,
            services: Vec::new(),
        }
    }

    /// Address to listen on; port 0 picks an ephemeral port.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Use an existing registry instance instead of building one from
    /// [`RegistryConfig`].
    pub fn registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Method-invoker extension name; empty means the family default.
    pub fn invoker(mut self, name: impl Into<String>) -> Self {
        self.invoker_name = name.into();
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    pub fn overload_policy(mut self, policy: OverloadPolicy) -> Self {
        self.config.overload_policy = policy;
        self
    }

    pub fn extensions(mut self, extensions: Arc<Extensions>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Host a service under `name#version#group` with weight 1.
    pub fn service(
        self,
        name: impl Into<String>,
        version: impl Into<String>,
        group: impl Into<String>,
        handler: ServiceHandler,
    ) -> Self {
        self.service_with_weight(name, version, group, 1, handler)
    }

    /// Host a service with an explicit instance weight.
    pub fn service_with_weight(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        group: impl Into<String>,
        weight: u32,
        handler: ServiceHandler,
    ) -> Self {
        self.services.push((
            ServiceSpec {
                name: name.into(),
                version: version.into(),
                group: group.into(),
                weight,
            },
            handler,
        ));
        self
    }

    /// Validate the configuration and assemble the server.
    ///
    /// Unknown extension names and duplicate service keys fail here, before
    /// anything binds or registers.
    pub fn build(self) -> Result<RpcServer> {
        let extensions = self
            .extensions
            .unwrap_or_else(|| Arc::new(Extensions::with_builtins()));
        let invoker = extensions.invoker(&self.invoker_name)?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => build_registry(&self.registry_config, &extensions)?,
        };

        let mut services = HashMap::new();
        let mut specs = Vec::new();
        for (spec, handler) in self.services {
            let key = service_key(&spec.name, &spec.version, &spec.group);
            if services.contains_key(&key) {
                return Err(RpcError::Config(format!(
                    "service `{key}` is already hosted"
                )));
            }
            services.insert(key, Arc::new(handler));
            specs.push(spec);
        }

        Ok(RpcServer {
            bind_addr: self.bind_addr,
            registry,
            specs,
            core: Arc::new(ServerCore {
                services,
                invoker,
                extensions,
                config: self.config,
            }),
        })
    }
}

/// Everything the per-connection tasks share.
struct ServerCore {
    services: HashMap<String, Arc<ServiceHandler>>,
    invoker: Arc<dyn MethodInvoker>,
    extensions: Arc<Extensions>,
    config: ServerConfig,
}

impl ServerCore {
    /// Resolve the service and invoke the method; failures become a failure
    /// response with the error stringified.
    fn dispatch(&self, request: &RpcRequest) -> RpcResponse {
        let key = request.service_key();
        let result = match self.services.get(&key) {
            Some(handler) => {
                self.invoker
                    .invoke(handler, &request.method_name, &request.parameters)
            }
            None => Err(RpcError::ServiceNotFound(key)),
        };

        match result {
            Ok(value) => RpcResponse::success(value, request),
            Err(e) => {
                warn!(
                    service = %request.service_name,
                    method = %request.method_name,
                    error = %e,
                    "call failed"
                );
                RpcResponse::failure(e.to_string(), request)
            }
        }
    }
}

/// The provider engine.
pub struct RpcServer {
    bind_addr: String,
    registry: Arc<dyn ServiceRegistry>,
    specs: Vec<ServiceSpec>,
    core: Arc<ServerCore>,
}

impl RpcServer {
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }

    /// Bind, publish every hosted service to the registry and start
    /// accepting connections.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        for spec in &self.specs {
            let meta = ServiceMeta {
                service_name: spec.name.clone(),
                service_version: spec.version.clone(),
                service_group: spec.group.clone(),
                service_addr: local_addr.ip().to_string(),
                service_port: local_addr.port(),
                weight: spec.weight,
            };
            self.registry.register(meta).await?;
        }

        info!(addr = %local_addr, services = self.specs.len(), "server listening");

        let core = self.core.clone();
        let task = tokio::spawn(accept_loop(listener, core));

        Ok(ServerHandle { local_addr, task })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and tear down existing connections' accept task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, core: Arc<ServerCore>) {
    let semaphore = Arc::new(Semaphore::new(core.config.max_workers));
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                tokio::spawn(connection_loop(stream, core.clone(), semaphore.clone()));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
            }
        }
    }
}

async fn connection_loop(stream: TcpStream, core: Arc<ServerCore>, semaphore: Arc<Semaphore>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "set_nodelay failed");
    }
    let (read_half, write_half) = stream.into_split();
    let (writer, _writer_task) = spawn_writer_task(write_half, core.config.writer.clone());

    read_connection(read_half, core, semaphore, writer).await;
}

async fn read_connection(
    mut read_half: OwnedReadHalf,
    core: Arc<ServerCore>,
    semaphore: Arc<Semaphore>,
    writer: WriterHandle,
) {
    let mut buffer = FrameBuffer::with_max_body(core.config.max_body_size);
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                return;
            }
            Ok(n) => {
                let frames = match buffer.push(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!(error = %e, "protocol error, dropping connection");
                        return;
                    }
                };
                for frame in frames {
                    match codec::decode(&frame, &core.extensions) {
                        Ok(Some(RpcMessage::Request { header, body })) => {
                            admit_request(&core, &semaphore, &writer, header, body).await;
                        }
                        Ok(Some(RpcMessage::Heartbeat { header })) => {
                            debug!(request_id = header.request_id, "heartbeat");
                        }
                        Ok(Some(RpcMessage::Response { header, .. })) => {
                            debug!(
                                request_id = header.request_id,
                                "dropping unexpected response frame"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "failed to decode frame");
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "read failed");
                return;
            }
        }
    }
}

/// Push one request through the bounded worker pool.
async fn admit_request(
    core: &Arc<ServerCore>,
    semaphore: &Arc<Semaphore>,
    writer: &WriterHandle,
    header: Header,
    request: RpcRequest,
) {
    let permit = match core.config.overload_policy {
        OverloadPolicy::Block => match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore closed only on shutdown.
            Err(_) => return,
        },
        OverloadPolicy::Reject => match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    request_id = header.request_id,
                    "worker pool saturated, rejecting request"
                );
                if !request.oneway {
                    let response =
                        RpcResponse::failure("worker pool saturated: request rejected", &request);
                    write_response(core, writer, &header, &response).await;
                }
                return;
            }
        },
    };

    let core = core.clone();
    let writer = writer.clone();
    tokio::spawn(handle_request(core, writer, header, request, permit));
}

async fn handle_request(
    core: Arc<ServerCore>,
    writer: WriterHandle,
    header: Header,
    request: RpcRequest,
    _permit: OwnedSemaphorePermit,
) {
    let response = core.dispatch(&request);
    if request.oneway {
        return;
    }
    write_response(&core, &writer, &header, &response).await;
}

/// Encode and queue a response; the outcome is logged, never propagated.
async fn write_response(
    core: &Arc<ServerCore>,
    writer: &WriterHandle,
    request_header: &Header,
    response: &RpcResponse,
) {
    let serialization = match request_header
        .serialization_name()
        .and_then(|name| core.extensions.serialization(name))
    {
        Ok(serialization) => serialization,
        Err(e) => {
            error!(request_id = request_header.request_id, error = %e, "cannot encode response");
            return;
        }
    };

    match codec::encode_response(request_header, serialization.as_ref(), response) {
        Ok(frame) => match writer.send(frame).await {
            Ok(()) => debug!(request_id = request_header.request_id, "response sent"),
            Err(e) => {
                error!(request_id = request_header.request_id, error = %e, "response write failed")
            }
        },
        Err(e) => {
            error!(request_id = request_header.request_id, error = %e, "response encode failed")
        }
    }
}
