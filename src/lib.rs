//! # wirecall
//!
//! An async RPC framework over TCP with a fixed 32-byte binary frame header,
//! pluggable serialization and client-side load balancing.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► ServiceProxy ──► RpcConsumer ──► ConsumerHandler ──► TcpStream
//!               (stub)        discover/select    writer task +
//!                             via ServiceRegistry correlation table
//!
//! TcpStream ──► FrameBuffer ──► codec ──► worker pool ──► ServiceHandler
//!               (provider side: RpcServer)                method table
//! ```
//!
//! - **Protocol** ([`protocol`]): 32-byte big-endian header (magic, message
//!   type, status, correlation id, serializer name, body length) and a
//!   resumable frame decoder that tolerates arbitrary packet fragmentation.
//! - **Extensions** ([`extension`]): four plugin families (serialization,
//!   load balancer, method invoker, proxy factory) resolved by name with
//!   lazily constructed, memoized singletons. No global state; an
//!   [`Extensions`] value is passed where needed.
//! - **Consumer** ([`consumer`], [`client`]): pooled connections keyed by
//!   endpoint, request/response correlation by id, sync, async-context and
//!   one-way calling modes.
//! - **Provider** ([`provider`]): bounded worker pool with a block-or-reject
//!   overload policy, dispatch through per-service method tables.
//! - **Registry** ([`registry`]): discovery seam with a bundled in-process
//!   backend; discovery applies the configured load balancer.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use wirecall::{
//!     Extensions, LocalRegistry, RegistryConfig, RpcClient, RpcServer, ServiceHandler,
//!     ServiceRegistry,
//! };
//!
//! # async fn run() -> wirecall::Result<()> {
//! let extensions = Arc::new(Extensions::with_builtins());
//! let registry: Arc<dyn ServiceRegistry> =
//!     Arc::new(LocalRegistry::new(&RegistryConfig::default(), &extensions)?);
//!
//! let handler = ServiceHandler::new().with_method("hello", |params: &[Value]| {
//!     let name = params.first().and_then(Value::as_str).unwrap_or("world");
//!     Ok(json!(format!("hello {name}")))
//! });
//!
//! let server = RpcServer::builder()
//!     .registry(registry.clone())
//!     .extensions(extensions.clone())
//!     .service("Demo", "1.0.0", "g", handler)
//!     .build()?
//!     .start()
//!     .await?;
//!
//! let client = RpcClient::builder()
//!     .registry(registry)
//!     .extensions(extensions)
//!     .version("1.0.0")
//!     .group("g")
//!     .build()?;
//!
//! let demo = client.proxy("Demo")?;
//! assert_eq!(demo.call("hello", vec![json!("x")]).await?, json!("hello x"));
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod extension;
pub mod invoker;
pub mod loadbalancer;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod serialization;
pub mod writer;

pub use client::{RpcClient, RpcClientBuilder};
pub use consumer::{ConsumerConfig, RpcConsumer, RpcContext, RpcFuture};
pub use error::{Result, RpcError};
pub use extension::Extensions;
pub use message::{service_key, RpcRequest, RpcResponse};
pub use provider::{OverloadPolicy, RpcServer, ServerConfig, ServerHandle, ServiceHandler};
pub use proxy::ServiceProxy;
pub use registry::{LocalRegistry, RegistryConfig, ServiceMeta, ServiceRegistry};
